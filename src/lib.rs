//! Receipt scan request lifecycle
//!
//! A scan session moves through capture, AI extraction, review and save. The
//! [`reducer`] owns every transition of the live [`request::ScanRequest`],
//! [`distributor::ScanStore`] publishes it to views and persists it through
//! [`persistence::SessionStore`], and [`service::ScanService`] drives the
//! async work (extraction, saving, credit reservation) around it.

pub mod batch;
pub mod config;
pub mod dialog;
pub mod distributor;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod migration;
pub mod persistence;
pub mod ports;
pub mod reducer;
pub mod request;
pub mod service;
pub mod transaction;
pub mod transactions;
pub mod utils;
