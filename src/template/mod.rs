//! Jinja2-compatible template rendering
//!
//! Renders the first-boot cloud-config document (and any other `*.j2`
//! templates a device directory needs) from a [`RenderContext`].

pub mod context;

pub use context::{RenderContext, UserRecord, substitute_env};

use crate::ProvisionError;
use crate::config::CloudConfig;
use minijinja::Environment;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Embedded first-boot cloud-config template
pub const FIRST_BOOT_TEMPLATE: &str = include_str!("../../templates/user-data.j2");

/// File name the first-boot document is written to
pub const FIRST_BOOT_FILE: &str = "user-data";

/// Template file suffix
const TEMPLATE_SUFFIX: &str = ".j2";

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env
}

/// Render a template string with a context
pub fn render(template: &str, context: &RenderContext) -> Result<String, ProvisionError> {
    render_named("template", template, context)
}

fn render_named(
    name: &str,
    template: &str,
    context: &RenderContext,
) -> Result<String, ProvisionError> {
    debug!("Rendering template {}", name);

    let env = environment();
    let tmpl = env
        .template_from_named_str(name, template)
        .map_err(|e| ProvisionError::Template(format!("{}: parse error: {}", name, e)))?;

    tmpl.render(context.to_value())
        .map_err(|e| ProvisionError::Template(format!("{}: render error: {}", name, e)))
}

/// Check the identity is present and fill in defaults
///
/// Every device document goes through this, whichever template renders it.
pub fn prepare_context(context: &RenderContext) -> Result<RenderContext, ProvisionError> {
    let mut missing = Vec::new();
    if context.machine_id.as_deref().is_none_or(str::is_empty) {
        missing.push("Error: \"machine_id\" not set".to_string());
    }
    if context.ddns_host.as_deref().is_none_or(str::is_empty) {
        missing.push("Error: \"ddns_host\" not set".to_string());
    }
    if !missing.is_empty() {
        return Err(ProvisionError::Validation(missing));
    }

    let mut context = context.clone();
    context.timezone = Some(context.timezone_or_default().to_string());
    Ok(context)
}

/// Reject rendered cloud-config that does not parse
fn check_cloud_config(name: &str, rendered: &str) -> Result<(), ProvisionError> {
    if CloudConfig::is_cloud_config(rendered) {
        CloudConfig::from_yaml(rendered).map_err(|e| {
            ProvisionError::Template(format!("{}: rendered cloud-config is invalid: {}", name, e))
        })?;
    }
    Ok(())
}

/// Render the embedded first-boot document
///
/// The output is parsed back as cloud-config so a broken document never
/// reaches the provisioning agent.
pub fn render_first_boot(context: &RenderContext) -> Result<String, ProvisionError> {
    let context = prepare_context(context)?;

    let rendered = render_named(FIRST_BOOT_FILE, FIRST_BOOT_TEMPLATE, &context)?;
    check_cloud_config(FIRST_BOOT_FILE, &rendered)?;

    Ok(rendered)
}

/// Render every `*.j2` file in a directory
///
/// Returns output file names (suffix stripped) mapped to rendered content.
/// Outputs starting with `#cloud-config` are parsed back like the embedded
/// document.
pub async fn render_dir(
    dir: impl AsRef<Path>,
    context: &RenderContext,
) -> Result<BTreeMap<String, String>, ProvisionError> {
    let dir = dir.as_ref();
    let context = prepare_context(context)?;
    let mut rendered = BTreeMap::new();

    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(output_name) = file_name.strip_suffix(TEMPLATE_SUFFIX) else {
            continue;
        };

        let template = fs::read_to_string(entry.path()).await?;
        let content = render_named(&file_name, &template, &context)?;
        check_cloud_config(&file_name, &content)?;
        rendered.insert(output_name.to_string(), content);
    }

    info!("Rendered {} templates from {}", rendered.len(), dir.display());
    Ok(rendered)
}
