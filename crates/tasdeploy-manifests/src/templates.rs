//! Text templates for the RTE node payloads: the notifier OCI hook and the
//! SELinux policy module

use minijinja::{AutoEscape, Environment, context};

use crate::assets;
use crate::error::Result;

/// File the hook touches to wake the exporter
pub const NOTIFY_FILE: &str = "/run/rte/notify";

/// Where the node installs the hook script
pub const HOOK_SCRIPT_DIR: &str = "/usr/local/bin";

/// Name of the hook script
pub const HOOK_SCRIPT_NAME: &str = "rte-notify.sh";

const HOOK_STAGES: [&str; 2] = ["prestart", "poststop"];

/// CIL block of the exporter policy; the exporter runs as `<block>.process`
pub const SELINUX_BLOCK: &str = "rte";

/// Rendered OCI hook definition and the script it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierHook {
    pub hook_json: String,
    pub script: String,
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.add_template("hook.json", assets::get("rte/hook.json.j2")?)?;
    env.add_template("notify.sh", assets::get("rte/notify.sh.j2")?)?;
    env.add_template("selinux.cil", assets::get("rte/selinux.cil.j2")?)?;
    env.add_template("data-url", "data:,{{ text | urlencode }}")?;
    Ok(env)
}

/// Render the hook pair for `notify_file`
pub fn render_notifier(notify_file: &str) -> Result<NotifierHook> {
    let env = environment()?;

    let hook_json = env.get_template("hook.json")?.render(context! {
        script_path => format!("{}/{}", HOOK_SCRIPT_DIR, HOOK_SCRIPT_NAME),
        script_name => HOOK_SCRIPT_NAME,
        notify_file => notify_file,
        stages => HOOK_STAGES.to_vec(),
    })?;
    let script = env
        .get_template("notify.sh")?
        .render(context! { notify_file => notify_file })?;

    Ok(NotifierHook { hook_json, script })
}

/// Rendered SELinux policy module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelinuxPolicy {
    pub cil: String,
    /// The module as an Ignition `data:` URL
    pub source: String,
}

impl SelinuxPolicy {
    /// SELinux type the exporter container runs as
    pub fn process_type(&self) -> String {
        format!("{}.process", SELINUX_BLOCK)
    }
}

pub fn render_selinux_policy() -> Result<SelinuxPolicy> {
    let env = environment()?;
    let cil = env
        .get_template("selinux.cil")?
        .render(context! { block => SELINUX_BLOCK })?;
    let source = env
        .get_template("data-url")?
        .render(context! { text => &cil })?;
    Ok(SelinuxPolicy { cil, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_json_is_valid() {
        let hook = render_notifier(NOTIFY_FILE).unwrap();
        let value: serde_json::Value = serde_json::from_str(&hook.hook_json).unwrap();

        assert_eq!(value["hook"]["path"], "/usr/local/bin/rte-notify.sh");
        assert_eq!(value["hook"]["args"][1], NOTIFY_FILE);
        assert_eq!(value["stages"], serde_json::json!(["prestart", "poststop"]));
    }

    #[test]
    fn test_script_uses_notify_file() {
        let hook = render_notifier("/tmp/poke").unwrap();
        assert!(hook.script.starts_with("#!/usr/bin/env bash"));
        assert!(hook.script.contains("${1:-/tmp/poke}"));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render_notifier(NOTIFY_FILE).unwrap(), render_notifier(NOTIFY_FILE).unwrap());
    }

    #[test]
    fn test_selinux_policy() {
        let policy = render_selinux_policy().unwrap();
        assert!(policy.cil.starts_with("(block rte"));
        assert!(policy.cil.contains("(blockinherit container)"));
        assert_eq!(policy.process_type(), "rte.process");

        assert!(policy.source.starts_with("data:,%28block%20rte"));
        assert!(!policy.source.contains(' '));
        assert!(!policy.source.contains('\n'));
    }
}
