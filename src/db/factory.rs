use crate::config::Config;
use crate::db::aggregate::PgAggregateStore;
use crate::db::source::PgSourceStore;
use crate::error::EtlError;
use crate::store::{AggregateStore, SourceStore, StoreFactory};

/// Opens a fresh connection per call; handles close when dropped.
#[derive(Debug, Clone)]
pub struct PgStoreFactory {
    source_url: String,
    aggregate_url: String,
}

impl PgStoreFactory {
    pub fn from_config(cfg: &Config) -> Self {
        PgStoreFactory {
            source_url: cfg.source_database_url.clone(),
            aggregate_url: cfg.aggregate_database_url.clone(),
        }
    }
}

impl StoreFactory for PgStoreFactory {
    fn source(&self) -> Result<Box<dyn SourceStore>, EtlError> {
        Ok(Box::new(PgSourceStore::connect(&self.source_url)?))
    }

    fn aggregate(&self) -> Result<Box<dyn AggregateStore>, EtlError> {
        Ok(Box::new(PgAggregateStore::connect(&self.aggregate_url)?))
    }
}
