//! Render command - print manifests without touching a cluster

use tasdeploy_kube::{offline_target, render_objects};
use tasdeploy_manifests::{Component, to_yaml_stream};
use tracing::debug;

use crate::GlobalArgs;
use crate::error::Result;
use crate::settings;

/// Run the render command
pub fn run(global: &GlobalArgs, component: Option<Component>) -> Result<()> {
    print!("{}", render(global, component)?);
    Ok(())
}

/// Render the requested components into one YAML stream
pub fn render(global: &GlobalArgs, component: Option<Component>) -> Result<String> {
    let opts = settings::deploy_options(global)?;
    let target = offline_target(&opts.platform);
    debug!(
        platform = %target.platform.discovered,
        version = %target.version.discovered,
        "rendering offline"
    );

    let components = match component {
        Some(c) => vec![c],
        None => Component::ALL.to_vec(),
    };

    let mut objects = Vec::new();
    for component in components {
        objects.extend(render_objects(
            component,
            target.platform.discovered,
            &target.version.discovered,
            &opts.render,
        )?);
    }
    Ok(to_yaml_stream(&objects)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_deterministic() {
        let global = GlobalArgs::default();
        assert_eq!(render(&global, None).unwrap(), render(&global, None).unwrap());
    }

    #[test]
    fn test_render_single_component() {
        let global = GlobalArgs {
            platform: Some("openshift:4.14".to_string()),
            ..Default::default()
        };
        let out = render(&global, Some(Component::Updater)).unwrap();
        assert!(out.contains("kind: SecurityContextConstraints"));
        assert!(!out.contains("kind: CustomResourceDefinition"));
    }

    #[test]
    fn test_render_auto_replicas_is_one() {
        let global = GlobalArgs {
            sched_replicas: Some(0),
            ..Default::default()
        };
        let out = render(&global, Some(Component::Scheduler)).unwrap();
        assert!(out.contains("replicas: 1"));
        assert!(out.contains("leaderElect: false"));
    }
}
