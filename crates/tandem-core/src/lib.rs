//! Connection and conversation services: matching, requests, connections,
//! conversations, messages, and live subscriptions over all of them.

mod convert;
mod store;

pub mod config;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod matching;
pub mod notifier;
pub mod policy;
pub mod profiles;
pub mod registry;
pub mod stream;
pub mod subscription;

use std::sync::Arc;

use tandem_db::Database;
use tandem_types::models::Role;

pub use config::CoreConfig;
pub use directory::{Directory, conversation_id_for};
pub use error::{CoreError, Result};
pub use ledger::Ledger;
pub use matching::MatchingEngine;
pub use notifier::Notifier;
pub use profiles::{HttpProfileDirectory, ProfileDirectory, StaticProfiles};
pub use registry::Registry;
pub use stream::MessageStream;
pub use subscription::Subscription;

use store::Store;

/// All services wired over one store and one notifier.
#[derive(Clone)]
pub struct Tandem {
    pub ledger: Ledger,
    pub registry: Registry,
    pub directory: Directory,
    pub messages: MessageStream,
    pub matching: MatchingEngine,
    notifier: Notifier,
    profiles: Arc<dyn ProfileDirectory>,
}

impl Tandem {
    pub fn new(db: Database, config: CoreConfig, profiles: Arc<dyn ProfileDirectory>) -> Self {
        let store = Store::new(db);
        let notifier = Notifier::with_capacity(config.notifier_capacity);

        let ledger = Ledger::new(store.clone(), notifier.clone());
        let registry = Registry::new(store.clone(), notifier.clone());
        let directory = Directory::new(
            store.clone(),
            notifier.clone(),
            registry.clone(),
            profiles.clone(),
            config.require_connection_for_messaging,
        );
        let messages = MessageStream::new(store, notifier.clone(), config.max_message_len);
        let matching = MatchingEngine::new(ledger.clone(), registry.clone());

        Self {
            ledger,
            registry,
            directory,
            messages,
            matching,
            notifier,
            profiles,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// The role the profile service records for `user_id`, if it knows one.
    pub async fn profile_role(&self, user_id: &str) -> Option<Role> {
        profiles::role_of(self.profiles.as_ref(), user_id).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::ops::Deref;
    use std::sync::Arc;

    use tandem_db::Database;

    use crate::{CoreConfig, StaticProfiles, Tandem};

    pub struct TestCore {
        pub tandem: Tandem,
        pub profiles: Arc<StaticProfiles>,
    }

    impl Deref for TestCore {
        type Target = Tandem;

        fn deref(&self) -> &Tandem {
            &self.tandem
        }
    }

    pub fn core() -> TestCore {
        core_with(CoreConfig::default())
    }

    pub fn core_with(config: CoreConfig) -> TestCore {
        let db = Database::open_in_memory().expect("in-memory database");
        let profiles = Arc::new(StaticProfiles::new());
        let tandem = Tandem::new(db, config, profiles.clone());
        TestCore { tandem, profiles }
    }
}
