//! Typed declarations for the resource kinds a static site is made of, and
//! their CloudFormation rendering.
//!
//! A declaration may render to several CloudFormation resources (a bucket and
//! its policy, a function with its role and version, ...) or to none at all
//! (a certificate referenced by ARN).

pub use cfn_resources::{create_policy_doc, get_att, get_ref, CfnResource, StrVal, ToOptStrVal};
pub use serde_json::{json, Value};

pub use crate::assets::{AssetManifest, AssetSource, Packaging};
pub use crate::error::{Error, Result};
pub use crate::template::*;

mod lambda;
pub use self::lambda::*;
mod s3_bucket;
pub use self::s3_bucket::*;
mod certificate;
pub use self::certificate::*;
mod cloudfront;
pub use self::cloudfront::*;
mod route53;
pub use self::route53::*;
mod bucket_deployment;
pub use self::bucket_deployment::*;

/// Template parameter naming the bucket the assets were published to.
pub const ASSETS_BUCKET_PARAMETER: &str = "AssetsBucketName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Bucket,
    CertificateReference,
    EdgeFunction,
    Distribution,
    DnsRecord,
    BucketDeployment,
}

#[derive(Debug, Clone, Copy)]
pub enum Declaration<'a> {
    Bucket(&'a WebsiteBucket),
    Certificate(&'a CertificateRef),
    EdgeFunction(&'a EdgeFunction),
    Distribution(&'a WebDistribution),
    Record(&'a AliasRecord),
    Deployment(&'a BucketDeployment),
}

impl Declaration<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Declaration::Bucket(_) => ResourceKind::Bucket,
            Declaration::Certificate(_) => ResourceKind::CertificateReference,
            Declaration::EdgeFunction(_) => ResourceKind::EdgeFunction,
            Declaration::Distribution(_) => ResourceKind::Distribution,
            Declaration::Record(_) => ResourceKind::DnsRecord,
            Declaration::Deployment(_) => ResourceKind::BucketDeployment,
        }
    }

    pub fn logical_id(&self) -> &str {
        match self {
            Declaration::Bucket(d) => &d.logical_id,
            Declaration::Certificate(d) => &d.logical_id,
            Declaration::EdgeFunction(d) => &d.logical_id,
            Declaration::Distribution(d) => &d.logical_id,
            Declaration::Record(d) => &d.logical_id,
            Declaration::Deployment(d) => &d.logical_id,
        }
    }

    /// CloudFormation resources for this declaration, with asset locations
    /// taken from `assets`.
    pub fn resources(&self, assets: &AssetManifest) -> Result<Vec<Resource>> {
        match self {
            Declaration::Bucket(d) => Ok(d.resources()),
            Declaration::Certificate(_) => Ok(vec![]),
            Declaration::EdgeFunction(d) => d.resources(assets),
            Declaration::Distribution(d) => d.resources(assets),
            Declaration::Record(d) => Ok(d.resources()),
            Declaration::Deployment(d) => d.resources(assets),
        }
    }
}
