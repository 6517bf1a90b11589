//! The static site stack: one bucket served through CloudFront under
//! `<sub-domain>.<domain>`, with an origin-request edge function and the
//! built website copied into the bucket.

use std::path::PathBuf;

use crate::config::{AppConfig, SiteParameters};
use crate::resources::*;

/// Lambda@Edge functions and CloudFront certificates only work from here.
pub const STACK_REGION: &str = "us-east-1";
pub const EDGE_FUNCTION_DIR: &str = "lambdas/static-web-hosting";
pub const WEBSITE_DIR: &str = "website-dist";

pub const EDGE_FUNCTION_ASSET_ID: &str = "LambdaEdgeRedirectCode";
pub const WEBSITE_ASSET_ID: &str = "DeployWebsiteSource";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackProps {
    pub stack_name: String,
    pub account: Option<String>,
    /// directory that `lambdas/` and `website-dist/` are resolved against
    pub project_dir: PathBuf,
}

impl StackProps {
    pub fn from_config(config: &AppConfig, project_dir: PathBuf) -> Self {
        Self {
            stack_name: config.stack_name.clone(),
            account: config.account.clone(),
            project_dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackOutput {
    pub name: String,
    pub value: Value,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticSiteStack {
    pub id: String,
    pub stack_name: String,
    pub account: Option<String>,
    pub region: String,
    pub hostname: String,
    pub bucket: WebsiteBucket,
    pub certificate: CertificateRef,
    pub edge_function: EdgeFunction,
    pub distribution: WebDistribution,
    pub record: AliasRecord,
    pub deployment: BucketDeployment,
    pub outputs: Vec<StackOutput>,
}

impl StaticSiteStack {
    /// Declares the whole site. Nothing is validated: empty parameters give a
    /// stack that CloudFormation will refuse, not an error here.
    pub fn new(id: &str, site: SiteParameters, props: StackProps) -> Self {
        let hostname = site.hostname();
        let hostname_id = short_logical_id_from(&hostname);

        let bucket = WebsiteBucket {
            logical_id: format!("S3Bucket{hostname_id}"),
            public_website: PublicWebsite::default(),
            public_read_access: true,
            cors: vec![CorsRule {
                allowed_origins: vec!["*".into()],
                allowed_methods: vec![
                    HttpMethod::Get,
                    HttpMethod::Post,
                    HttpMethod::Put,
                    HttpMethod::Delete,
                    HttpMethod::Head,
                ],
            }],
            removal_policy: RemovalPolicy::Destroy,
        };

        let certificate = CertificateRef::from_certificate_arn("SiteCert".to_string(), site.ssl_certificate_arn.clone());

        let edge_function = EdgeFunction {
            logical_id: "LambdaEdgeRedirect".into(),
            runtime: EDGE_FUNCTION_RUNTIME.into(),
            handler: EDGE_FUNCTION_HANDLER.into(),
            code: AssetSource {
                id: EDGE_FUNCTION_ASSET_ID.into(),
                path: props.project_dir.join(EDGE_FUNCTION_DIR),
                packaging: Packaging::ZipDirectory,
            },
            memory_size: 128,
            version_removal_policy: RemovalPolicy::Destroy,
        };

        let distribution = WebDistribution {
            logical_id: format!("CDN{hostname_id}"),
            default_root_object: DEFAULT_ROOT_OBJECT.into(),
            http_version: HttpVersion::Http2,
            error_configurations: remapped_error_configurations(),
            origin: S3OriginConfig {
                bucket_logical_id: bucket.logical_id.clone(),
                default_behavior: Behavior {
                    compress: true,
                    allowed_methods: AllowedMethods::GetHeadOptions,
                    cached_methods: CachedMethods::GetHeadOptions,
                    lambda_function_associations: vec![LambdaFunctionAssociation::current_version_of(
                        &edge_function,
                        LambdaEdgeEventType::OriginRequest,
                    )],
                },
            },
            viewer_certificate: ViewerCertificate::from_acm_certificate(
                &certificate,
                vec![hostname.clone()],
                SecurityPolicyProtocol::TlsV1,
                SslMethod::Sni,
            ),
        };

        let record = AliasRecord {
            logical_id: "DistributionRecord".into(),
            record_name: hostname.clone(),
            zone: HostedZone::from_lookup(&site.domain_name),
            target: RecordTarget::CloudFrontDistribution {
                logical_id: distribution.logical_id.clone(),
            },
        };

        let deployment = BucketDeployment {
            logical_id: "DeployWebsite".into(),
            sources: vec![AssetSource {
                id: WEBSITE_ASSET_ID.into(),
                path: props.project_dir.join(WEBSITE_DIR),
                packaging: Packaging::Files,
            }],
            destination_bucket_logical_id: bucket.logical_id.clone(),
            retain_on_delete: false,
            prune: true,
        };

        let outputs = vec![
            StackOutput {
                name: "Bucket".into(),
                value: sub(&format!("s3://${{{}}}", bucket.logical_id)),
                description: "site bucket".into(),
            },
            StackOutput {
                name: "CfDomain".into(),
                value: get_att(&distribution.logical_id, "DomainName"),
                description: "distribution domain name".into(),
            },
            StackOutput {
                name: "CfId".into(),
                value: get_ref(&distribution.logical_id),
                description: "distribution id".into(),
            },
        ];

        Self {
            id: id.to_string(),
            stack_name: props.stack_name,
            account: props.account,
            region: STACK_REGION.to_string(),
            hostname,
            bucket,
            certificate,
            edge_function,
            distribution,
            record,
            deployment,
            outputs,
        }
    }

    pub fn from_config(config: &AppConfig, project_dir: PathBuf) -> Self {
        Self::new(&config.stack_id, config.site.clone(), StackProps::from_config(config, project_dir))
    }

    pub fn declarations(&self) -> Vec<Declaration<'_>> {
        vec![
            Declaration::Bucket(&self.bucket),
            Declaration::Certificate(&self.certificate),
            Declaration::EdgeFunction(&self.edge_function),
            Declaration::Distribution(&self.distribution),
            Declaration::Record(&self.record),
            Declaration::Deployment(&self.deployment),
        ]
    }

    /// Local directories that must be staged before the stack can render.
    pub fn asset_sources(&self) -> Vec<AssetSource> {
        let mut sources = vec![self.edge_function.code.clone()];
        sources.extend(self.deployment.sources.iter().cloned());
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn scenario() -> StaticSiteStack {
        let site = SiteParameters::new("www", "example.com", "arn:aws:acm:us-east-1:123456789012:certificate/abc");
        let props = StackProps {
            stack_name: "static-site-test".into(),
            account: Some("123456789012".into()),
            project_dir: PathBuf::from("."),
        };
        StaticSiteStack::new("dev", site, props)
    }

    #[test]
    fn hostname_joins_sub_domain_and_domain() {
        for (sub, domain) in [("www", "example.com"), ("blog", "a.b.co"), ("", ""), ("x", "")] {
            let site = SiteParameters::new(sub, domain, "");
            let stack = StaticSiteStack::new("dev", site, StackProps {
                stack_name: "s".into(),
                account: None,
                project_dir: PathBuf::from("."),
            });
            assert_eq!(stack.hostname, format!("{sub}.{domain}"));
            assert_eq!(stack.distribution.viewer_certificate.aliases, vec![stack.hostname.clone()]);
            assert_eq!(stack.record.record_name, stack.hostname);
        }
    }

    #[test]
    fn scenario_declares_one_of_each_kind() {
        let stack = scenario();
        assert_eq!(stack.hostname, "www.example.com");
        assert_eq!(stack.region, "us-east-1");
        assert_eq!(stack.account.as_deref(), Some("123456789012"));

        let kinds: BTreeSet<ResourceKind> = stack.declarations().iter().map(Declaration::kind).collect();
        assert_eq!(stack.declarations().len(), 6);
        assert_eq!(kinds.len(), 6);

        assert_eq!(stack.distribution.viewer_certificate.aliases, vec!["www.example.com"]);
        assert_eq!(
            stack.distribution.viewer_certificate.certificate_arn,
            "arn:aws:acm:us-east-1:123456789012:certificate/abc"
        );
        let names: Vec<&str> = stack.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Bucket", "CfDomain", "CfId"]);
        assert_eq!(stack.outputs[0].value, json!({ "Fn::Sub": "s3://${S3Bucketwwwexamplecom}" }));
        assert_eq!(stack.record.zone.zone_name, "example.com.");
    }

    #[test]
    fn longest_hostnames_keep_logical_ids_short() {
        let label = "a".repeat(63);
        let sub_domain = format!("{label}.{label}.{label}");
        let domain = format!("{}.com", "b".repeat(57));
        let site = SiteParameters::new(sub_domain.as_str(), domain.as_str(), "");
        let stack = StaticSiteStack::new("dev", site, StackProps {
            stack_name: "s".into(),
            account: None,
            project_dir: PathBuf::from("."),
        });
        assert_eq!(stack.hostname.len(), 253);
        for id in [stack.bucket.logical_id.clone(), stack.bucket.policy_logical_id(), stack.distribution.logical_id.clone()] {
            assert!(verify_resource_name(&id).is_none(), "{id}");
            assert!(id.len() <= 80, "{id}");
        }
        assert_eq!(stack.record.record_name, stack.hostname);
    }

    #[test]
    fn edge_function_runs_on_origin_request() {
        let stack = scenario();
        let associations = &stack.distribution.origin.default_behavior.lambda_function_associations;
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].event_type, LambdaEdgeEventType::OriginRequest);
        assert_eq!(associations[0].function_logical_id, stack.edge_function.logical_id);
        assert_eq!(stack.edge_function.code.path, PathBuf::from("./lambdas/static-web-hosting"));
    }

    #[test]
    fn five_errors_map_to_the_not_found_page() {
        let stack = scenario();
        let codes: BTreeSet<u16> = stack.distribution.error_configurations.iter().map(|e| e.error_code).collect();
        assert_eq!(codes, BTreeSet::from([400, 403, 404, 405, 500]));
        assert_eq!(stack.distribution.error_configurations.len(), 5);
        assert!(stack
            .distribution
            .error_configurations
            .iter()
            .all(|e| e.response_page_path == "/404.html"));
    }

    #[test]
    fn site_content_is_destroyed_with_the_stack() {
        let stack = scenario();
        assert_eq!(stack.bucket.removal_policy, RemovalPolicy::Destroy);
        assert_eq!(stack.edge_function.version_removal_policy, RemovalPolicy::Destroy);
        assert!(!stack.deployment.retain_on_delete);
        assert_eq!(stack.deployment.destination_bucket_logical_id, stack.bucket.logical_id);
        assert!(stack.bucket.public_read_access);
        assert_eq!(stack.bucket.cors[0].allowed_methods.len(), 5);
    }

    #[test]
    fn asset_sources_cover_the_edge_bundle_and_the_website() {
        let ids: Vec<String> = scenario().asset_sources().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![EDGE_FUNCTION_ASSET_ID, WEBSITE_ASSET_ID]);
    }
}
