//! Source and target endpoints of a comparison.

use crate::config::TransportConfig;
use crate::connection::{ConnectionInfo, UserIdentity};
use crate::constants::TABULAR_METADATA_COMPATIBILITY_LEVEL;
use crate::error::ConnectionError;
use crate::xmla::{TabularServer, XmlaServer};
use tracing::{info, warn};

/// Builds one server per endpoint.
pub trait ServerFactory {
    type Server: TabularServer;

    fn create(&self) -> Self::Server;
}

/// Factory for XMLA-over-HTTP servers sharing one transport configuration.
#[derive(Debug, Clone)]
pub struct XmlaServerFactory {
    transport: TransportConfig,
}

impl XmlaServerFactory {
    pub fn new(transport: TransportConfig) -> Self {
        Self { transport }
    }
}

impl ServerFactory for XmlaServerFactory {
    type Server = XmlaServer;

    fn create(&self) -> XmlaServer {
        XmlaServer::new(self.transport.clone())
    }
}

/// A pair of endpoints to compare.
#[derive(Debug, Clone)]
pub struct ComparisonSession {
    pub source: ConnectionInfo,
    pub target: ConnectionInfo,
}

impl ComparisonSession {
    pub fn new(source: ConnectionInfo, target: ConnectionInfo) -> Self {
        Self { source, target }
    }

    /// Resolve project endpoints, initialize source then target, and check
    /// that the two models can be compared.
    pub async fn initialize<F: ServerFactory>(
        &mut self,
        factory: &F,
        user: &UserIdentity,
        closed_bim_file: bool,
    ) -> Result<(), ConnectionError> {
        for (label, endpoint) in [("source", &mut self.source), ("target", &mut self.target)] {
            if endpoint.use_project {
                endpoint.resolve_project(user)?;
            }
            let mut server = factory.create();
            endpoint
                .initialize_compatibility_level(&mut server, closed_bim_file)
                .await?;
            info!("Initialized {} {}", label, endpoint);
        }

        self.check_compatibility()?;
        if self.direct_query_mismatch() {
            warn!("Only one of {} and {} uses direct query", self.source, self.target);
        }
        Ok(())
    }

    /// Fail unless both endpoints are initialized with comparable
    /// compatibility levels.
    ///
    /// Levels below 1200 use multidimensional metadata and 1200 and above use
    /// tabular metadata; the two families never compare. Within the older
    /// family the target must be at least the source level.
    pub fn check_compatibility(&self) -> Result<(), ConnectionError> {
        let (Some(source), Some(target)) = (
            self.source.compatibility_level(),
            self.target.compatibility_level(),
        ) else {
            return Err(ConnectionError::incompatible_levels(
                "Both models must be initialized before they can be compared",
            ));
        };

        let source_tabular = source >= TABULAR_METADATA_COMPATIBILITY_LEVEL;
        let target_tabular = target >= TABULAR_METADATA_COMPATIBILITY_LEVEL;
        if source_tabular != target_tabular {
            return Err(ConnectionError::incompatible_levels(format!(
                "Source compatibility level {} and target compatibility level {} cannot be compared. \
                 Both must be below {} or both must be {} or above.",
                source,
                target,
                TABULAR_METADATA_COMPATIBILITY_LEVEL,
                TABULAR_METADATA_COMPATIBILITY_LEVEL
            )));
        }
        if !source_tabular && source > target {
            return Err(ConnectionError::incompatible_levels(format!(
                "Source compatibility level {} is higher than target compatibility level {}",
                source, target
            )));
        }
        Ok(())
    }

    /// True when exactly one initialized endpoint uses direct query.
    pub fn direct_query_mismatch(&self) -> bool {
        matches!(
            (self.source.direct_query(), self.target.direct_query()),
            (Some(a), Some(b)) if a != b
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::FakeServer;
    use crate::xmla::DirectQueryMode;
    use std::collections::HashMap;

    struct FakeFactory {
        levels: HashMap<&'static str, i32>,
        direct_query: bool,
    }

    impl ServerFactory for FakeFactory {
        type Server = FakeServer;

        fn create(&self) -> FakeServer {
            let mut server = FakeServer::tabular();
            for (name, level) in &self.levels {
                server = server.with_database(name, *level);
            }
            if self.direct_query {
                server.facts.database_mode = DirectQueryMode::DirectQuery;
            }
            server
        }
    }

    async fn initialized(source: i32, target: i32) -> Result<ComparisonSession, ConnectionError> {
        let factory = FakeFactory {
            levels: HashMap::from([("Source", source), ("Target", target)]),
            direct_query: false,
        };
        let mut session = ComparisonSession::new(
            ConnectionInfo::for_database("srv", "Source"),
            ConnectionInfo::for_database("srv", "Target"),
        );
        session
            .initialize(&factory, &UserIdentity::new("jdoe"), false)
            .await
            .map(|_| session)
    }

    #[tokio::test]
    async fn test_same_family_compares() {
        let session = initialized(1400, 1200).await.unwrap();
        assert_eq!(session.source.compatibility_level(), Some(1400));
        assert_eq!(session.target.compatibility_level(), Some(1200));
        assert!(!session.direct_query_mismatch());

        assert!(initialized(1100, 1103).await.is_ok());
    }

    #[tokio::test]
    async fn test_mixed_families_fail() {
        let err = initialized(1103, 1200).await.unwrap_err();
        assert!(matches!(err, ConnectionError::IncompatibleLevels(_)));
    }

    #[tokio::test]
    async fn test_legacy_source_above_target_fails() {
        let err = initialized(1103, 1100).await.unwrap_err();
        assert!(err.to_string().contains("higher"));
    }

    #[test]
    fn test_uninitialized_fails() {
        let session = ComparisonSession::new(
            ConnectionInfo::for_database("a", "b"),
            ConnectionInfo::for_database("c", "d"),
        );
        assert!(session.check_compatibility().is_err());
        assert!(!session.direct_query_mismatch());
    }
}
