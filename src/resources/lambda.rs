use super::*;
use ::iam::role::{CfnRole, Policy};
use ::lambda::function::{CfnFunction, Code};
use ::lambda::version::CfnVersion;
use serde_json::Map;

pub const EDGE_FUNCTION_RUNTIME: &str = "nodejs20.x";
pub const EDGE_FUNCTION_HANDLER: &str = "index.handler";

pub fn create_assume_role_policy_doc(services: &[&str]) -> Value {
    let mut map = Map::default();
    map.insert("Version".to_string(), Value::String("2012-10-17".to_string()));

    let mut principal = Map::default();
    let services = services.iter().map(|s| Value::String(s.to_string())).collect();
    principal.insert("Service".to_string(), Value::Array(services));

    let mut statement_obj = Map::default();
    statement_obj.insert("Effect".to_string(), Value::String("Allow".to_string()));
    statement_obj.insert("Principal".to_string(), Value::Object(principal));
    statement_obj.insert("Action".to_string(), Value::String("sts:AssumeRole".to_string()));
    map.insert("Statement".to_string(), Value::Array(vec![Value::Object(statement_obj)]));
    Value::Object(map)
}

/// Lets a function write its CloudWatch logs. Lambda@Edge replicas log in
/// the region that served the request, hence the wildcard region.
pub fn log_policy(policy_name: String) -> Policy {
    let logs = || StrVal::from("arn:aws:logs:*:*:*");
    Policy {
        policy_name: policy_name.into(),
        policy_document: create_policy_doc(&[
            ("Allow".to_string(), "logs:CreateLogGroup".to_string(), logs(), StrVal::from("")),
            ("Allow".to_string(), "logs:CreateLogStream".to_string(), logs(), StrVal::from("")),
            ("Allow".to_string(), "logs:PutLogEvents".to_string(), logs(), StrVal::from("")),
        ]),
    }
}

/// `AWS::Lambda::Function` with its runtime written as a plain string, since
/// the generated runtime enum has no variant for current node runtimes.
pub struct RuntimeFunction {
    pub function: CfnFunction,
    pub runtime: String,
}

impl CfnResource for RuntimeFunction {
    fn type_string(&self) -> &'static str {
        self.function.type_string()
    }

    fn properties(&self) -> Value {
        let mut properties = self.function.properties();
        if let Value::Object(map) = &mut properties {
            map.insert("Runtime".to_string(), Value::String(self.runtime.clone()));
        }
        properties
    }
}

/// A Lambda@Edge function bundled from a local directory.
///
/// The bundle is opaque: CloudFront hands it an origin request and expects a
/// request back, possibly with its path rewritten, before the request is
/// forwarded to the bucket. What the rewrite does lives in the bundle, not
/// here.
///
/// CloudFront can only be associated with a published version, so a
/// `AWS::Lambda::Version` is rendered alongside the function. Its logical id
/// carries the code hash, which publishes a new version whenever the bundle
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeFunction {
    pub logical_id: String,
    pub runtime: String,
    pub handler: String,
    pub code: AssetSource,
    pub memory_size: u32,
    pub version_removal_policy: RemovalPolicy,
}

pub fn current_version_logical_id(function_logical_id: &str, code_hash: &str) -> String {
    format!("{function_logical_id}CurrentVersion{code_hash}")
}

impl EdgeFunction {
    pub fn role_logical_id(&self) -> String {
        format!("{}ServiceRole", self.logical_id)
    }

    pub fn resources(&self, assets: &AssetManifest) -> Result<Vec<Resource>> {
        let code = assets.get(&self.code.id)?;
        let role_logical_id = self.role_logical_id();
        let role = CfnRole {
            description: Some(format!("execution role of {}", self.logical_id).into()),
            assume_role_policy_document: create_assume_role_policy_doc(&[
                "lambda.amazonaws.com",
                "edgelambda.amazonaws.com",
            ]),
            policies: Some(vec![log_policy(format!("{}Logs", self.logical_id))]),
            ..Default::default()
        };
        let function = CfnFunction {
            handler: self.handler.as_str().to_str_val(),
            memory_size: Some(self.memory_size as _),
            role: get_att(&role_logical_id, "Arn").into(),
            code: Code {
                s3_bucket: Some(StrVal::Val(get_ref(ASSETS_BUCKET_PARAMETER))),
                s3_key: code.object_key.as_str().to_str_val(),
                ..Default::default()
            },
            ..Default::default()
        };
        let version = CfnVersion {
            function_name: StrVal::Val(get_ref(&self.logical_id)),
            ..Default::default()
        };
        Ok(vec![
            Resource::new(role_logical_id, role),
            Resource::new(&self.logical_id, RuntimeFunction {
                function,
                runtime: self.runtime.clone(),
            }),
            Resource::new(current_version_logical_id(&self.logical_id, &code.hash), version)
                .with_removal_policy(self.version_removal_policy),
        ])
    }
}
