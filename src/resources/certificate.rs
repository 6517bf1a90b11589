use super::*;

/// An existing ACM certificate, known only by its ARN.
///
/// Nothing is created for it and nothing checks that it covers the hostname
/// or lives in `us-east-1`; CloudFront rejects a bad certificate when the
/// distribution is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRef {
    pub logical_id: String,
    pub certificate_arn: String,
}

impl CertificateRef {
    pub fn from_certificate_arn<S: Into<String>>(logical_id: S, certificate_arn: S) -> Self {
        Self {
            logical_id: logical_id.into(),
            certificate_arn: certificate_arn.into(),
        }
    }
}
