//! Sakura Cloud provider for SkyFlow
//!
//! This crate implements the `ServerProvider` trait for Sakura Cloud,
//! driving server power operations through the usacloud CLI.
//!
//! # Requirements
//!
//! - `usacloud` CLI must be installed and configured
//! - Authentication is managed through usacloud configuration
//!
//! # Example
//!
//! ```ignore
//! use skyflow_cloud::ServerProvider;
//! use skyflow_cloud_sakura::SakuraCloudProvider;
//!
//! let provider = SakuraCloudProvider::new("is1a");
//! let handle = provider.start_server("113000000001").await?;
//! ```

pub mod error;
pub mod provider;
pub mod usacloud;

pub use error::{Result, SakuraError};
pub use provider::{DEFAULT_ZONE, PROVIDER_NAME, SakuraCloudProvider};
pub use usacloud::Usacloud;
