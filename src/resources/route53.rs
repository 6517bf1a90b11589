use super::*;
use ::route53::record_set::{AliasTarget, CfnRecordSet, RecordSetTypeEnum};

/// static for all of AWS for aliases to CloudFront.
/// see: https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html#cfn-route53-aliastarget-hostedzoneid
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub zone_name: String,
}

impl HostedZone {
    /// The public zone for `domain_name`. The zone is matched by name when
    /// CloudFormation creates the record, so no AWS call is made here.
    pub fn from_lookup(domain_name: &str) -> Self {
        let mut zone_name = domain_name.to_string();
        if !zone_name.ends_with('.') {
            zone_name.push('.'); // hosted zone name must end in .
        }
        Self { zone_name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTarget {
    CloudFrontDistribution { logical_id: String },
}

/// An `A` alias record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRecord {
    pub logical_id: String,
    pub record_name: String,
    pub zone: HostedZone,
    pub target: RecordTarget,
}

impl AliasRecord {
    pub fn resources(&self) -> Vec<Resource> {
        let alias_target = match &self.target {
            RecordTarget::CloudFrontDistribution { logical_id } => AliasTarget {
                dns_name: StrVal::Val(get_att(logical_id, "DomainName")),
                hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.into(),
                ..Default::default()
            },
        };
        let record = CfnRecordSet {
            name: self.record_name.as_str().into(),
            cfn_type: RecordSetTypeEnum::A,
            hosted_zone_name: self.zone.zone_name.as_str().to_str_val(),
            alias_target: Some(alias_target),
            ..Default::default()
        };
        vec![Resource::new(&self.logical_id, record)]
    }
}
