use std::sync::Arc;

use tandem_core::Tandem;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub core: Tandem,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(core: Tandem, jwt_secret: impl Into<String>) -> AppState {
        Arc::new(Self {
            core,
            jwt_secret: jwt_secret.into(),
        })
    }
}
