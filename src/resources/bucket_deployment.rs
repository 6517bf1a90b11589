use super::*;
use ::iam::role::{CfnRole, Policy};
use ::lambda::function::{CfnFunction, Code};

pub const DEPLOYMENT_HANDLER_RUNTIME: &str = "nodejs20.x";
const DEPLOYMENT_HANDLER_TIMEOUT: u32 = 300;
const DEPLOYMENT_HANDLER_MEMORY: u32 = 256;

/// Copies every object under `SourcePrefixes` of the staging bucket into the
/// destination bucket with the prefix stripped, then removes destination
/// objects that were not copied. On stack deletion the destination bucket is
/// emptied unless `RetainOnDelete` is `"true"`.
const DEPLOYMENT_HANDLER_CODE: &str = r#"
const { S3Client, ListObjectsV2Command, CopyObjectCommand, DeleteObjectsCommand } = require('@aws-sdk/client-s3')
const response = require('cfn-response')
const s3 = new S3Client({})
async function listKeys(bucket, prefix) {
    const keys = []
    let token
    do {
        const data = await s3.send(new ListObjectsV2Command({ Bucket: bucket, Prefix: prefix, ContinuationToken: token }))
        for (const obj of data.Contents || []) {
            keys.push(obj.Key)
        }
        token = data.NextContinuationToken
    } while (token)
    return keys
}
async function deleteKeys(bucket, keys) {
    for (let i = 0; i < keys.length; i += 1000) {
        const objects = keys.slice(i, i + 1000).map(Key => ({ Key }))
        await s3.send(new DeleteObjectsCommand({ Bucket: bucket, Delete: { Objects: objects } }))
    }
}
async function deploy(props) {
    const copied = new Set()
    for (const prefix of props.SourcePrefixes) {
        for (const key of await listKeys(props.SourceBucketName, prefix)) {
            const dest = key.slice(prefix.length)
            if (!dest) continue
            await s3.send(new CopyObjectCommand({
                Bucket: props.DestinationBucketName,
                Key: dest,
                CopySource: props.SourceBucketName + '/' + key.split('/').map(encodeURIComponent).join('/'),
            }))
            copied.add(dest)
        }
    }
    if (props.Prune === 'true') {
        const stale = (await listKeys(props.DestinationBucketName, '')).filter(k => !copied.has(k))
        await deleteKeys(props.DestinationBucketName, stale)
    }
}
exports.handler = async function(event, context) {
    const props = event.ResourceProperties
    let responseType = response.SUCCESS
    try {
        if (event.RequestType == 'Delete') {
            if (props.RetainOnDelete !== 'true') {
                await deleteKeys(props.DestinationBucketName, await listKeys(props.DestinationBucketName, ''))
            }
        } else {
            await deploy(props)
        }
    } catch (err) {
        console.log(err)
        responseType = response.FAILED
    }
    await response.send(event, context, responseType, {}, props.DestinationBucketName)
}
"#;

/// Populates a bucket with the content of local directories.
///
/// The directories are published to the staging bucket before the stack is
/// deployed; the custom resource then copies them over. Source prefixes
/// carry the content hash, so changed content changes the resource
/// properties and triggers an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDeployment {
    pub logical_id: String,
    pub sources: Vec<AssetSource>,
    pub destination_bucket_logical_id: String,
    pub retain_on_delete: bool,
    pub prune: bool,
}

impl BucketDeployment {
    pub fn handler_logical_id(&self) -> String {
        format!("{}Handler", self.logical_id)
    }

    pub fn role_logical_id(&self) -> String {
        format!("{}HandlerRole", self.logical_id)
    }

    pub fn resources(&self, assets: &AssetManifest) -> Result<Vec<Resource>> {
        let mut source_prefixes = vec![];
        for source in &self.sources {
            source_prefixes.push(assets.get(&source.id)?.object_key.clone());
        }

        let allow = |action: &str, resource: &Value| {
            ("Allow".to_string(), action.to_string(), StrVal::Val(resource.clone()), StrVal::from(""))
        };
        let staging_bucket = sub(&format!("arn:aws:s3:::${{{ASSETS_BUCKET_PARAMETER}}}"));
        let staging_objects = sub(&format!("arn:aws:s3:::${{{ASSETS_BUCKET_PARAMETER}}}/*"));
        let destination_bucket = get_att(&self.destination_bucket_logical_id, "Arn");
        let destination_objects = sub(&format!("arn:aws:s3:::${{{}}}/*", self.destination_bucket_logical_id));
        let copy_policy = Policy {
            policy_name: format!("{}Copy", self.logical_id).into(),
            policy_document: create_policy_doc(&[
                allow("s3:ListBucket", &staging_bucket),
                allow("s3:GetObject", &staging_objects),
                allow("s3:ListBucket", &destination_bucket),
                allow("s3:GetObject", &destination_objects),
                allow("s3:PutObject", &destination_objects),
                allow("s3:DeleteObject", &destination_objects),
            ]),
        };
        let role_logical_id = self.role_logical_id();
        let role = CfnRole {
            description: Some(format!("execution role of {}", self.handler_logical_id()).into()),
            assume_role_policy_document: create_assume_role_policy_doc(&["lambda.amazonaws.com"]),
            policies: Some(vec![copy_policy, log_policy(format!("{}Logs", self.logical_id))]),
            ..Default::default()
        };

        let handler_logical_id = self.handler_logical_id();
        let handler = CfnFunction {
            handler: "index.handler".to_str_val(),
            timeout: Some(DEPLOYMENT_HANDLER_TIMEOUT as _),
            memory_size: Some(DEPLOYMENT_HANDLER_MEMORY as _),
            role: get_att(&role_logical_id, "Arn").into(),
            code: Code {
                zip_file: DEPLOYMENT_HANDLER_CODE.to_str_val(),
                ..Default::default()
            },
            ..Default::default()
        };
        let handler = RuntimeFunction {
            function: handler,
            runtime: DEPLOYMENT_HANDLER_RUNTIME.to_string(),
        };

        let deployment = CustomBucketDeployment {
            handler_logical_id: handler_logical_id.clone(),
            source_prefixes,
            destination_bucket_logical_id: self.destination_bucket_logical_id.clone(),
            retain_on_delete: self.retain_on_delete,
            prune: self.prune,
        };

        Ok(vec![
            Resource::new(role_logical_id, role),
            Resource::new(handler_logical_id, handler),
            Resource::new(&self.logical_id, deployment),
        ])
    }
}

struct CustomBucketDeployment {
    handler_logical_id: String,
    source_prefixes: Vec<String>,
    destination_bucket_logical_id: String,
    retain_on_delete: bool,
    prune: bool,
}

impl CfnResource for CustomBucketDeployment {
    fn type_string(&self) -> &'static str {
        "Custom::BucketDeployment"
    }

    fn properties(&self) -> Value {
        // custom resource properties reach the handler as strings
        json!({
            "ServiceToken": get_att(&self.handler_logical_id, "Arn"),
            "SourceBucketName": get_ref(ASSETS_BUCKET_PARAMETER),
            "SourcePrefixes": self.source_prefixes,
            "DestinationBucketName": get_ref(&self.destination_bucket_logical_id),
            "RetainOnDelete": self.retain_on_delete.to_string(),
            "Prune": self.prune.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StagedAsset;
    use std::path::PathBuf;

    fn deployment() -> BucketDeployment {
        BucketDeployment {
            logical_id: "DeployWebsite".into(),
            sources: vec![AssetSource {
                id: "website".into(),
                path: PathBuf::from("website-dist"),
                packaging: Packaging::Files,
            }],
            destination_bucket_logical_id: "S3Bucketwwwexamplecom".into(),
            retain_on_delete: false,
            prune: true,
        }
    }

    fn manifest() -> AssetManifest {
        AssetManifest {
            assets: vec![StagedAsset {
                id: "website".into(),
                source_path: PathBuf::from("website-dist"),
                packaging: Packaging::Files,
                hash: "a1b2c3d4".into(),
                object_key: "assets/a1b2c3d4/".into(),
                staged_path: None,
            }],
        }
    }

    #[test]
    fn renders_role_handler_and_custom_resource() {
        let resources = deployment().resources(&manifest()).unwrap();
        let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["DeployWebsiteHandlerRole", "DeployWebsiteHandler", "DeployWebsite"]);
        assert_eq!(resources[2].properties.type_string(), "Custom::BucketDeployment");

        let role = resources[0].properties.properties();
        let copy = role["Policies"][0]["PolicyDocument"].to_string();
        assert!(copy.contains("s3:PutObject"));
        assert!(copy.contains("arn:aws:s3:::${AssetsBucketName}/*"));

        let handler = resources[1].properties.properties();
        assert!(handler["Code"]["ZipFile"].as_str().unwrap().contains("cfn-response"));
        assert_eq!(handler["Runtime"], "nodejs20.x");
        assert_eq!(handler["Timeout"], 300);
        assert_eq!(handler["Role"], json!({ "Fn::GetAtt": ["DeployWebsiteHandlerRole", "Arn"] }));
    }

    #[test]
    fn custom_resource_points_at_staged_content() {
        let resources = deployment().resources(&manifest()).unwrap();
        let props = resources[2].properties.properties();
        assert_eq!(props["SourcePrefixes"], json!(["assets/a1b2c3d4/"]));
        assert_eq!(props["SourceBucketName"], json!({ "Ref": "AssetsBucketName" }));
        assert_eq!(props["DestinationBucketName"], json!({ "Ref": "S3Bucketwwwexamplecom" }));
        assert_eq!(props["RetainOnDelete"], "false");
        assert_eq!(props["Prune"], "true");
        assert_eq!(props["ServiceToken"], json!({ "Fn::GetAtt": ["DeployWebsiteHandler", "Arn"] }));
    }

    #[test]
    fn copy_source_keys_are_encoded_per_segment() {
        // `?` and `#` in object keys must not end the copy source
        assert!(DEPLOYMENT_HANDLER_CODE.contains("key.split('/').map(encodeURIComponent).join('/')"));
        assert!(!DEPLOYMENT_HANDLER_CODE.contains("encodeURI(key)"));
    }

    #[test]
    fn unstaged_content_is_an_error() {
        let result = deployment().resources(&AssetManifest::default());
        assert!(matches!(result, Err(Error::AssetNotFound(_))));
    }
}
