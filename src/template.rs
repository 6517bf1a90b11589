//! CloudFormation template model.
//!
//! Declarations render themselves into [`Resource`]s; [`resources_to_template`]
//! validates their logical ids and collects them into a [`SavedTemplate`],
//! which is what gets written to disk and sent to CloudFormation.
//!
//! All maps are `BTreeMap`s so the serialized template is byte-for-byte
//! reproducible for the same inputs.

use std::collections::BTreeMap;

use cfn_resources::CfnResource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Longest hostname-derived part of a logical id. Leaves room for the
/// prefixes and suffixes the declarations add within the 255 character
/// limit.
pub const MAX_HOSTNAME_ID_LEN: usize = 64;

/// What CloudFormation does with the physical resource when it is removed
/// from the stack or the stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[serde(rename = "Delete")]
    Destroy,
    #[serde(rename = "Retain")]
    Retain,
}

pub struct Resource {
    pub name: String,
    pub properties: Box<dyn CfnResource>,
    pub removal_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(name: impl Into<String>, properties: impl CfnResource + 'static) -> Self {
        Self {
            name: name.into(),
            properties: Box::new(properties),
            removal_policy: None,
        }
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none", default)]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none", default)]
    pub update_replace_policy: Option<RemovalPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Description")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: Default::default(),
            parameters: Default::default(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    /// resources of the given CloudFormation type, by logical id.
    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }

    pub fn to_json(&self) -> Result<String> {
        // pretty, so the template reads well in the CloudFormation console
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yml",
        }
    }

    pub fn render(&self, template: &SavedTemplate) -> Result<String> {
        match self {
            TemplateFormat::Json => template.to_json(),
            TemplateFormat::Yaml => template.to_yaml(),
        }
    }
}

pub fn verify_resource_name(resource_name: &str) -> Option<String> {
    if resource_name.len() > 255 {
        return Some(format!("Invalid resource name {:?}\nmust be less than 255 characters", resource_name));
    }
    if resource_name.is_empty() {
        return Some(format!("Invalid resource name {:?}\nMust contain at least 1 character", resource_name));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", resource_name));
    }
    None
}

/// Strips everything that is not allowed in a logical id.
pub fn logical_id_from(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// [`logical_id_from`] capped at [`MAX_HOSTNAME_ID_LEN`]. Longer ids are cut
/// and suffixed with the adler32 of the whole input so distinct long
/// hostnames stay distinct.
pub fn short_logical_id_from(s: &str) -> String {
    let mut id = logical_id_from(s);
    if id.len() <= MAX_HOSTNAME_ID_LEN {
        return id;
    }
    let checksum = adler::adler32_slice(s.as_bytes());
    id.truncate(MAX_HOSTNAME_ID_LEN - 8);
    id.push_str(&format!("{checksum:08x}"));
    id
}

pub fn resources_to_template(resources: Vec<Resource>, template: &mut SavedTemplate) -> Result<()> {
    for resource in resources {
        if let Some(e) = verify_resource_name(&resource.name) {
            return Err(Error::InvalidResourceName(e));
        }
        if template.resources.contains_key(&resource.name) {
            return Err(Error::InvalidResourceName(format!("Duplicate resource name {:?}", resource.name)));
        }
        if let Err(e) = resource.properties.validate() {
            return Err(Error::Validation(format!("Validation failed on resource '{}'\n{e}", resource.name)));
        }
        let saved_resource = SavedResource {
            ty: resource.properties.type_string().to_string(),
            properties: resource.properties.properties(),
            deletion_policy: resource.removal_policy,
            update_replace_policy: resource.removal_policy,
        };
        template.resources.insert(resource.name, saved_resource);
    }
    Ok(())
}

/// `{ "Fn::Sub": s }`
pub fn sub(s: &str) -> Value {
    json!({ "Fn::Sub": s })
}
