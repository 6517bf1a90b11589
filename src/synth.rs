//! Stack + staged assets -> files in the out dir.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::assets::{self, AssetManifest};
use crate::error::{Error, Result};
use crate::resources::{ASSETS_BUCKET_PARAMETER, ResourceOutput, SavedTemplate, TemplateFormat, TemplateParameter, resources_to_template};
use crate::stack::StaticSiteStack;

#[derive(Debug, Clone, PartialEq)]
pub struct SynthOutput {
    pub template: SavedTemplate,
    pub manifest: AssetManifest,
    pub template_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Renders every declaration of `stack` into a single template. Assets must
/// already be staged into `manifest`.
pub fn render_template(stack: &StaticSiteStack, manifest: &AssetManifest) -> Result<SavedTemplate> {
    let mut template = SavedTemplate {
        description: format!("Static site {} ({})", stack.hostname, stack.id),
        ..Default::default()
    };
    template.parameters.insert(
        ASSETS_BUCKET_PARAMETER.to_string(),
        TemplateParameter {
            ty: "String".to_string(),
            description: "bucket holding the published assets".to_string(),
        },
    );
    for declaration in stack.declarations() {
        resources_to_template(declaration.resources(manifest)?, &mut template)?;
    }
    for output in &stack.outputs {
        template.outputs.insert(
            output.name.clone(),
            ResourceOutput {
                description: output.description.clone(),
                value: output.value.clone(),
            },
        );
    }
    Ok(template)
}

pub fn template_path(out_dir: &Path, stack_name: &str, format: TemplateFormat) -> PathBuf {
    out_dir.join(format!("{stack_name}.template.{}", format.extension()))
}

pub fn manifest_path(out_dir: &Path, stack_name: &str) -> PathBuf {
    out_dir.join(format!("{stack_name}.assets.json"))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::Io(format!("Failed to write {}\n{e}", path.display())))
}

/// Stages the stack's assets into `out_dir` and writes the template and the
/// asset manifest next to them.
pub fn synthesize(stack: &StaticSiteStack, out_dir: &Path, format: TemplateFormat) -> Result<SynthOutput> {
    let manifest = assets::stage_all(&stack.asset_sources(), out_dir)?;
    let template = render_template(stack, &manifest)?;

    let template_path = template_path(out_dir, &stack.stack_name, format);
    write_file(&template_path, &format.render(&template)?)?;
    let manifest_path = manifest_path(out_dir, &stack.stack_name);
    write_file(&manifest_path, &manifest.to_json()?)?;
    info!(
        stack = %stack.stack_name,
        resources = template.resources.len(),
        template = %template_path.display(),
        "synthesized stack"
    );

    Ok(SynthOutput {
        template,
        manifest,
        template_path,
        manifest_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteParameters;
    use crate::resources::RemovalPolicy;
    use crate::stack::{StackProps, EDGE_FUNCTION_DIR, WEBSITE_DIR};
    use tempfile::tempdir;

    fn project(dir: &Path) {
        let lambda = dir.join(EDGE_FUNCTION_DIR);
        std::fs::create_dir_all(&lambda).unwrap();
        std::fs::write(lambda.join("index.js"), "exports.handler = async (e) => e.Records[0].cf.request;").unwrap();
        let website = dir.join(WEBSITE_DIR);
        std::fs::create_dir_all(&website).unwrap();
        std::fs::write(website.join("index.html"), "<h1>hello</h1>").unwrap();
        std::fs::write(website.join("404.html"), "<h1>not found</h1>").unwrap();
    }

    fn stack(project_dir: &Path) -> StaticSiteStack {
        let site = SiteParameters::new("www", "example.com", "arn:aws:acm:us-east-1:123456789012:certificate/abc");
        StaticSiteStack::new("dev", site, StackProps {
            stack_name: "static-site-test".into(),
            account: None,
            project_dir: project_dir.to_path_buf(),
        })
    }

    #[test]
    fn synthesized_template_matches_the_topology() {
        let project_dir = tempdir().unwrap();
        project(project_dir.path());
        let out = tempdir().unwrap();

        let synth = synthesize(&stack(project_dir.path()), out.path(), TemplateFormat::Json).unwrap();
        let template = &synth.template;
        assert!(!template.resources.is_empty());

        let count = |ty: &str| template.resources_of_type(ty).count();
        assert_eq!(count("AWS::S3::Bucket"), 1);
        assert_eq!(count("AWS::S3::BucketPolicy"), 1);
        assert_eq!(count("AWS::CloudFront::Distribution"), 1);
        assert_eq!(count("AWS::Route53::RecordSet"), 1);
        assert_eq!(count("AWS::Lambda::Version"), 1);
        assert_eq!(count("AWS::Lambda::Function"), 2);
        assert_eq!(count("Custom::BucketDeployment"), 1);
        assert_eq!(count("AWS::IAM::Role"), 2);
        assert_eq!(template.resources.len(), 10);

        assert_eq!(template.resources["S3Bucketwwwexamplecom"].deletion_policy, Some(RemovalPolicy::Destroy));
        let outputs: Vec<&String> = template.outputs.keys().collect();
        assert_eq!(outputs, vec!["Bucket", "CfDomain", "CfId"]);
        assert!(template.parameters.contains_key("AssetsBucketName"));

        assert!(synth.template_path.ends_with("static-site-test.template.json"));
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&synth.template_path).unwrap()).unwrap();
        assert_eq!(written["Resources"]["DistributionRecord"]["Properties"]["Name"], "www.example.com");

        let manifest = AssetManifest::from_json(&std::fs::read_to_string(&synth.manifest_path).unwrap()).unwrap();
        assert_eq!(manifest, synth.manifest);
        assert_eq!(manifest.assets.len(), 2);
    }

    #[test]
    fn version_logical_id_follows_the_edge_bundle() {
        let project_dir = tempdir().unwrap();
        project(project_dir.path());
        let out = tempdir().unwrap();
        let stack = stack(project_dir.path());

        let first = synthesize(&stack, out.path(), TemplateFormat::Json).unwrap();
        let again = synthesize(&stack, out.path(), TemplateFormat::Json).unwrap();
        assert_eq!(first.template, again.template);

        std::fs::write(project_dir.path().join(EDGE_FUNCTION_DIR).join("index.js"), "exports.handler = () => null;").unwrap();
        let changed = synthesize(&stack, out.path(), TemplateFormat::Json).unwrap();
        let version = |t: &SavedTemplate| t.resources_of_type("AWS::Lambda::Version").map(|(k, _)| k.clone()).next().unwrap();
        assert_ne!(version(&first.template), version(&changed.template));
    }

    #[test]
    fn longest_valid_hostname_synthesizes() {
        let project_dir = tempdir().unwrap();
        project(project_dir.path());
        let out = tempdir().unwrap();
        let label = "a".repeat(63);
        let sub_domain = format!("{label}.{label}.{label}");
        let domain = format!("{}.com", "b".repeat(57));
        let site = SiteParameters::new(sub_domain.as_str(), domain.as_str(), "arn:aws:acm:us-east-1:1:certificate/abc");
        let stack = StaticSiteStack::new("dev", site, StackProps {
            stack_name: "static-site-test".into(),
            account: None,
            project_dir: project_dir.path().to_path_buf(),
        });
        assert_eq!(stack.hostname.len(), 253);

        let synth = synthesize(&stack, out.path(), TemplateFormat::Json).unwrap();
        assert_eq!(synth.template.resources.len(), 10);
        assert!(synth.template.resources.keys().all(|id| id.len() <= 255));
    }

    #[test]
    fn missing_website_directory_fails_synthesis() {
        let project_dir = tempdir().unwrap();
        let lambda = project_dir.path().join(EDGE_FUNCTION_DIR);
        std::fs::create_dir_all(&lambda).unwrap();
        std::fs::write(lambda.join("index.js"), "").unwrap();
        let out = tempdir().unwrap();

        match synthesize(&stack(project_dir.path()), out.path(), TemplateFormat::Yaml) {
            Err(Error::AssetNotFound(path)) => assert!(path.ends_with(WEBSITE_DIR)),
            other => panic!("Expected `AssetNotFound` error, got {:?}", other.map(|s| s.template_path)),
        }
    }

    #[test]
    fn yaml_output_uses_the_yml_extension() {
        let project_dir = tempdir().unwrap();
        project(project_dir.path());
        let out = tempdir().unwrap();
        let synth = synthesize(&stack(project_dir.path()), out.path(), TemplateFormat::Yaml).unwrap();
        assert!(synth.template_path.ends_with("static-site-test.template.yml"));
        let body = std::fs::read_to_string(&synth.template_path).unwrap();
        assert!(body.contains("AWSTemplateFormatVersion"));
    }
}
