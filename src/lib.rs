//! Declares a static website hosting stack (S3 bucket, CloudFront
//! distribution with a Lambda@Edge origin-request function, Route 53 alias
//! record and a deployment of the built site) and turns it into a
//! CloudFormation template, then publishes and deploys it.
//!
//! ```no_run
//! use std::path::PathBuf;
//! use static_site::{AppConfig, EnvVars, StaticSiteStack, TemplateFormat};
//!
//! let vars = EnvVars::load(".env".as_ref()).unwrap();
//! let config = AppConfig::from_env(&vars);
//! let stack = StaticSiteStack::from_config(&config, PathBuf::from("."));
//! static_site::synth::synthesize(&stack, "site.out".as_ref(), TemplateFormat::Json).unwrap();
//! ```

pub mod assets;
pub mod config;
pub mod deploy;
mod error;
pub mod resources;
pub mod stack;
pub mod synth;
pub mod template;

pub use config::{AppConfig, EnvVars, SiteParameters};
pub use error::{Error, Result};
pub use stack::{StackProps, StaticSiteStack};
pub use template::{SavedTemplate, TemplateFormat};
