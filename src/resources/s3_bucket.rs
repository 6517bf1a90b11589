use super::*;
use ::s3::bucket::{
    CfnBucket, CorsConfiguration, CorsRule as CfnCorsRule, PublicAccessBlockConfiguration, WebsiteConfiguration,
};
use ::s3::bucket_policy::CfnBucketPolicy;

pub const INDEX_DOCUMENT: &str = "index.html";
pub const ERROR_DOCUMENT: &str = "404.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicWebsite {
    pub index_document: String,
    pub error_document: String,
}

impl Default for PublicWebsite {
    fn default() -> Self {
        Self {
            index_document: INDEX_DOCUMENT.into(),
            error_document: ERROR_DOCUMENT.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<HttpMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteBucket {
    pub logical_id: String,
    pub public_website: PublicWebsite,
    pub public_read_access: bool,
    pub cors: Vec<CorsRule>,
    pub removal_policy: RemovalPolicy,
}

impl WebsiteBucket {
    pub fn policy_logical_id(&self) -> String {
        format!("{}Policy", self.logical_id)
    }

    fn cfn_bucket(&self) -> CfnBucket {
        let mut bucket = CfnBucket {
            website_configuration: Some(WebsiteConfiguration {
                index_document: self.public_website.index_document.as_str().to_str_val(),
                error_document: self.public_website.error_document.as_str().to_str_val(),
                ..Default::default()
            }),
            ..Default::default()
        };
        if !self.cors.is_empty() {
            let cors_rules = self
                .cors
                .iter()
                .map(|rule| CfnCorsRule {
                    allowed_origins: rule.allowed_origins.iter().map(|o| o.as_str().into()).collect(),
                    allowed_methods: rule.allowed_methods.iter().map(|m| m.as_str().into()).collect(),
                    ..Default::default()
                })
                .collect();
            bucket.cors_configuration = Some(CorsConfiguration {
                cors_rules,
                ..Default::default()
            });
        }
        if self.public_read_access {
            // a public bucket policy is rejected unless the block is relaxed
            bucket.public_access_block_configuration = Some(PublicAccessBlockConfiguration {
                block_public_acls: true.into(),
                ignore_public_acls: true.into(),
                block_public_policy: false.into(),
                restrict_public_buckets: false.into(),
                ..Default::default()
            });
        }
        bucket
    }

    pub fn resources(&self) -> Vec<Resource> {
        let mut out = vec![Resource::new(&self.logical_id, self.cfn_bucket()).with_removal_policy(self.removal_policy)];
        if self.public_read_access {
            let objects = sub(&format!("arn:aws:s3:::${{{}}}/*", self.logical_id));
            let policy = CfnBucketPolicy {
                bucket: StrVal::Val(get_ref(&self.logical_id)),
                policy_document: create_policy_doc(&[
                    ("Allow".to_string(), "s3:GetObject".to_string(), StrVal::Val(objects), StrVal::from("*")),
                ]),
            };
            out.push(Resource::new(self.policy_logical_id(), policy));
        }
        out
    }
}
