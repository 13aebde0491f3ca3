//! Catalog cache and query layer for a storefront of iOS apps.
//!
//! The remote catalog is fetched wholesale by [`catalog::CatalogClient`],
//! persisted as a single snapshot by [`store::CatalogCache`], kept current by
//! [`refresh::RefreshScheduler`], and filtered for display by [`view`].

pub mod catalog;
pub mod cli;
pub mod config;
pub mod logging;
pub mod refresh;
pub mod store;
pub mod utils;
pub mod view;
