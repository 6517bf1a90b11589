use super::*;
use ::cloud_front::distribution::{
    CfnDistribution, CustomErrorResponse, DefaultCacheBehavior, DefaultCacheBehaviorViewerProtocolPolicyEnum,
    DistributionConfig, DistributionConfigHttpVersionEnum, DistributionConfigPriceClassEnum,
    LambdaFunctionAssociation as CfnLambdaFunctionAssociation, LambdaFunctionAssociationEventTypeEnum, Origin,
    S3OriginConfig as CfnS3OriginConfig, ViewerCertificate as CfnViewerCertificate,
    ViewerCertificateMinimumProtocolVersionEnum, ViewerCertificateSslSupportMethodEnum,
};

/// managed "CachingOptimized" policy.
/// see: https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

pub const DEFAULT_ROOT_OBJECT: &str = "index.html";
pub const ERROR_RESPONSE_PAGE: &str = "/404.html";
/// Every remapped error is answered with this status, including the custom
/// page itself. Kept as deployed today even though a 2xx looks intended.
pub const ERROR_RESPONSE_CODE: u16 = 400;
pub const ERROR_CACHING_MIN_TTL: u32 = 10;
pub const REMAPPED_ERROR_CODES: [u16; 5] = [404, 400, 403, 405, 500];

const DEFAULT_ORIGIN_ID: &str = "origin1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaEdgeEventType {
    ViewerRequest,
    OriginRequest,
    OriginResponse,
    ViewerResponse,
}

impl From<LambdaEdgeEventType> for LambdaFunctionAssociationEventTypeEnum {
    fn from(event_type: LambdaEdgeEventType) -> Self {
        match event_type {
            LambdaEdgeEventType::ViewerRequest => LambdaFunctionAssociationEventTypeEnum::Viewerrequest,
            LambdaEdgeEventType::OriginRequest => LambdaFunctionAssociationEventTypeEnum::Originrequest,
            LambdaEdgeEventType::OriginResponse => LambdaFunctionAssociationEventTypeEnum::Originresponse,
            LambdaEdgeEventType::ViewerResponse => LambdaFunctionAssociationEventTypeEnum::Viewerresponse,
        }
    }
}

/// Points a behavior at the current version of an [`EdgeFunction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaFunctionAssociation {
    pub event_type: LambdaEdgeEventType,
    pub function_logical_id: String,
    pub code_asset_id: String,
}

impl LambdaFunctionAssociation {
    pub fn current_version_of(function: &EdgeFunction, event_type: LambdaEdgeEventType) -> Self {
        Self {
            event_type,
            function_logical_id: function.logical_id.clone(),
            code_asset_id: function.code.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedMethods {
    GetHead,
    GetHeadOptions,
    All,
}

impl AllowedMethods {
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
            AllowedMethods::All => &["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedMethods {
    GetHead,
    GetHeadOptions,
}

impl CachedMethods {
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            CachedMethods::GetHead => &["GET", "HEAD"],
            CachedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behavior {
    pub compress: bool,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: CachedMethods,
    pub lambda_function_associations: Vec<LambdaFunctionAssociation>,
}

/// The bucket origin with its single default behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3OriginConfig {
    pub bucket_logical_id: String,
    pub default_behavior: Behavior,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorConfiguration {
    pub error_code: u16,
    pub error_caching_min_ttl: u32,
    pub response_code: u16,
    pub response_page_path: String,
}

pub fn remapped_error_configurations() -> Vec<ErrorConfiguration> {
    REMAPPED_ERROR_CODES
        .iter()
        .map(|code| ErrorConfiguration {
            error_code: *code,
            error_caching_min_ttl: ERROR_CACHING_MIN_TTL,
            response_code: ERROR_RESPONSE_CODE,
            response_page_path: ERROR_RESPONSE_PAGE.into(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicyProtocol {
    TlsV1,
    TlsV1_2016,
    TlsV1_1_2016,
    TlsV1_2_2019,
    TlsV1_2_2021,
}

impl From<SecurityPolicyProtocol> for ViewerCertificateMinimumProtocolVersionEnum {
    fn from(protocol: SecurityPolicyProtocol) -> Self {
        match protocol {
            SecurityPolicyProtocol::TlsV1 => ViewerCertificateMinimumProtocolVersionEnum::Tlsv1,
            SecurityPolicyProtocol::TlsV1_2016 => ViewerCertificateMinimumProtocolVersionEnum::Tlsv12016,
            SecurityPolicyProtocol::TlsV1_1_2016 => ViewerCertificateMinimumProtocolVersionEnum::Tlsv112016,
            SecurityPolicyProtocol::TlsV1_2_2019 => ViewerCertificateMinimumProtocolVersionEnum::Tlsv122019,
            SecurityPolicyProtocol::TlsV1_2_2021 => ViewerCertificateMinimumProtocolVersionEnum::Tlsv122021,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMethod {
    Sni,
    Vip,
}

impl From<SslMethod> for ViewerCertificateSslSupportMethodEnum {
    fn from(method: SslMethod) -> Self {
        match method {
            SslMethod::Sni => ViewerCertificateSslSupportMethodEnum::Snionly,
            SslMethod::Vip => ViewerCertificateSslSupportMethodEnum::Vip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http1_1,
    Http2,
}

impl From<HttpVersion> for DistributionConfigHttpVersionEnum {
    fn from(version: HttpVersion) -> Self {
        match version {
            HttpVersion::Http1_1 => DistributionConfigHttpVersionEnum::Http11,
            HttpVersion::Http2 => DistributionConfigHttpVersionEnum::Http2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerCertificate {
    pub certificate_arn: String,
    pub aliases: Vec<String>,
    pub security_policy: SecurityPolicyProtocol,
    pub ssl_method: SslMethod,
}

impl ViewerCertificate {
    pub fn from_acm_certificate(
        certificate: &CertificateRef,
        aliases: Vec<String>,
        security_policy: SecurityPolicyProtocol,
        ssl_method: SslMethod,
    ) -> Self {
        Self {
            certificate_arn: certificate.certificate_arn.clone(),
            aliases,
            security_policy,
            ssl_method,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDistribution {
    pub logical_id: String,
    pub default_root_object: String,
    pub http_version: HttpVersion,
    pub error_configurations: Vec<ErrorConfiguration>,
    pub origin: S3OriginConfig,
    pub viewer_certificate: ViewerCertificate,
}

impl WebDistribution {
    fn default_cache_behavior(&self, assets: &AssetManifest) -> Result<DefaultCacheBehavior> {
        let behavior = &self.origin.default_behavior;
        let mut associations = vec![];
        for association in &behavior.lambda_function_associations {
            let code = assets.get(&association.code_asset_id)?;
            let version = current_version_logical_id(&association.function_logical_id, &code.hash);
            associations.push(CfnLambdaFunctionAssociation {
                event_type: Some(association.event_type.into()),
                lambda_function_arn: Some(StrVal::Val(get_ref(&version))),
                ..Default::default()
            });
        }
        Ok(DefaultCacheBehavior {
            target_origin_id: DEFAULT_ORIGIN_ID.into(),
            viewer_protocol_policy: DefaultCacheBehaviorViewerProtocolPolicyEnum::Redirecttohttps,
            cache_policy_id: CACHING_OPTIMIZED_POLICY_ID.to_str_val(),
            compress: Some(behavior.compress),
            allowed_methods: Some(behavior.allowed_methods.methods().iter().map(|m| (*m).into()).collect()),
            cached_methods: Some(behavior.cached_methods.methods().iter().map(|m| (*m).into()).collect()),
            lambda_function_associations: Some(associations),
            ..Default::default()
        })
    }

    pub fn resources(&self, assets: &AssetManifest) -> Result<Vec<Resource>> {
        let error_responses = self
            .error_configurations
            .iter()
            .map(|e| CustomErrorResponse {
                error_code: e.error_code as _,
                error_caching_min_ttl: Some(e.error_caching_min_ttl as _),
                response_code: Some(e.response_code as _),
                response_page_path: e.response_page_path.as_str().to_str_val(),
                ..Default::default()
            })
            .collect();
        let certificate = &self.viewer_certificate;
        let origin = Origin {
            id: DEFAULT_ORIGIN_ID.into(),
            domain_name: StrVal::Val(get_att(&self.origin.bucket_logical_id, "RegionalDomainName")),
            s3_origin_config: Some(CfnS3OriginConfig::default()),
            ..Default::default()
        };
        let distribution = CfnDistribution {
            distribution_config: DistributionConfig {
                enabled: true,
                ipv6_enabled: Some(true),
                price_class: Some(DistributionConfigPriceClassEnum::Priceclass100),
                default_root_object: self.default_root_object.as_str().to_str_val(),
                http_version: Some(self.http_version.into()),
                aliases: Some(certificate.aliases.iter().map(|a| a.as_str().into()).collect()),
                viewer_certificate: Some(CfnViewerCertificate {
                    acm_certificate_arn: certificate.certificate_arn.as_str().to_str_val(),
                    minimum_protocol_version: Some(certificate.security_policy.into()),
                    ssl_support_method: Some(certificate.ssl_method.into()),
                    ..Default::default()
                }),
                custom_error_responses: Some(error_responses),
                origins: Some(vec![origin]),
                default_cache_behavior: self.default_cache_behavior(assets)?,
                ..Default::default()
            },
            ..Default::default()
        };
        Ok(vec![Resource::new(&self.logical_id, distribution)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StagedAsset;
    use std::path::PathBuf;

    fn distribution() -> WebDistribution {
        let certificate = CertificateRef::from_certificate_arn("SiteCert", "arn:aws:acm:us-east-1:1:certificate/abc");
        WebDistribution {
            logical_id: "CDNwwwexamplecom".into(),
            default_root_object: DEFAULT_ROOT_OBJECT.into(),
            http_version: HttpVersion::Http2,
            error_configurations: remapped_error_configurations(),
            origin: S3OriginConfig {
                bucket_logical_id: "S3Bucketwwwexamplecom".into(),
                default_behavior: Behavior {
                    compress: true,
                    allowed_methods: AllowedMethods::GetHeadOptions,
                    cached_methods: CachedMethods::GetHeadOptions,
                    lambda_function_associations: vec![LambdaFunctionAssociation {
                        event_type: LambdaEdgeEventType::OriginRequest,
                        function_logical_id: "LambdaEdgeRedirect".into(),
                        code_asset_id: "edge".into(),
                    }],
                },
            },
            viewer_certificate: ViewerCertificate::from_acm_certificate(
                &certificate,
                vec!["www.example.com".into()],
                SecurityPolicyProtocol::TlsV1,
                SslMethod::Sni,
            ),
        }
    }

    fn manifest() -> AssetManifest {
        AssetManifest {
            assets: vec![StagedAsset {
                id: "edge".into(),
                source_path: PathBuf::from("lambdas/static-web-hosting"),
                packaging: Packaging::ZipDirectory,
                hash: "12345678".into(),
                object_key: "assets/12345678.zip".into(),
                staged_path: None,
            }],
        }
    }

    #[test]
    fn remaps_exactly_five_errors_to_the_same_page() {
        let errors = remapped_error_configurations();
        let mut codes: Vec<u16> = errors.iter().map(|e| e.error_code).collect();
        codes.sort();
        assert_eq!(codes, vec![400, 403, 404, 405, 500]);
        for e in &errors {
            assert_eq!(e.response_page_path, "/404.html");
            assert_eq!(e.response_code, 400);
            assert_eq!(e.error_caching_min_ttl, 10);
        }
    }

    #[test]
    fn default_behavior_runs_the_edge_function_on_origin_request() {
        let resources = distribution().resources(&manifest()).unwrap();
        assert_eq!(resources.len(), 1);
        let props = resources[0].properties.properties();
        let config = &props["DistributionConfig"];
        let associations = config["DefaultCacheBehavior"]["LambdaFunctionAssociations"].as_array().unwrap();
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0]["EventType"], "origin-request");
        assert_eq!(
            associations[0]["LambdaFunctionARN"],
            json!({ "Ref": "LambdaEdgeRedirectCurrentVersion12345678" })
        );
        assert_eq!(config["DefaultCacheBehavior"]["Compress"], true);
        assert_eq!(config["DefaultCacheBehavior"]["AllowedMethods"], json!(["GET", "HEAD", "OPTIONS"]));
        assert_eq!(config["DefaultCacheBehavior"]["ViewerProtocolPolicy"], "redirect-to-https");
        assert_eq!(config["DefaultCacheBehavior"]["CachePolicyId"], CACHING_OPTIMIZED_POLICY_ID);
        assert_eq!(config["DefaultCacheBehavior"]["TargetOriginId"], config["Origins"][0]["Id"]);
        assert_eq!(
            config["Origins"][0]["DomainName"],
            json!({ "Fn::GetAtt": ["S3Bucketwwwexamplecom", "RegionalDomainName"] })
        );
    }

    #[test]
    fn binds_certificate_with_one_alias() {
        let props = distribution().resources(&manifest()).unwrap()[0].properties.properties();
        let config = &props["DistributionConfig"];
        assert_eq!(config["Aliases"], json!(["www.example.com"]));
        assert_eq!(config["ViewerCertificate"]["AcmCertificateArn"], "arn:aws:acm:us-east-1:1:certificate/abc");
        assert_eq!(config["ViewerCertificate"]["MinimumProtocolVersion"], "TLSv1");
        assert_eq!(config["ViewerCertificate"]["SslSupportMethod"], "sni-only");
        assert_eq!(config["HttpVersion"], "http2");
        assert_eq!(config["DefaultRootObject"], "index.html");
        assert_eq!(config["PriceClass"], "PriceClass_100");
        assert_eq!(config["Enabled"], true);

        let errors = config["CustomErrorResponses"].as_array().unwrap();
        assert_eq!(errors.len(), 5);
        assert_eq!(errors[0]["ErrorCode"], 404);
        assert_eq!(errors[0]["ResponseCode"], 400);
        assert_eq!(errors[0]["ResponsePagePath"], "/404.html");
    }
}
