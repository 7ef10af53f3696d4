//! Images command - list the component pull specs

use tasdeploy_core::{Images, UpdaterKind};

use crate::GlobalArgs;
use crate::build_info;
use crate::display;
use crate::error::Result;
use crate::settings;

/// Images after the image flags and settings are applied
fn configured_images(global: &GlobalArgs) -> Result<Images> {
    let opts = settings::deploy_options(global)?.render;
    let mut images = Images::default();

    if let Some(image) = opts.updater.image {
        match opts.updater.kind {
            UpdaterKind::Rte => images.resource_topology_exporter = image,
            UpdaterKind::Nfd => images.topology_updater = image,
        }
    }
    // The other updater's flag is not routed through the options
    if let Some(image) = &global.rte_image {
        images.resource_topology_exporter = image.clone();
    }
    if let Some(image) = &global.nfd_image {
        images.topology_updater = image.clone();
    }
    if let Some(image) = opts.scheduler.image {
        images.scheduler_plugin = image;
    }
    if let Some(image) = opts.scheduler.controller_image {
        images.scheduler_controller = image;
    }
    Ok(images)
}

/// Images as printed by the command
pub fn images(global: &GlobalArgs, sha: bool) -> Result<Images> {
    let images = configured_images(global)?;
    if sha {
        let revision = global
            .image_mirror_revision
            .unwrap_or_else(build_info::mirror_revision);
        return Ok(images.mirrored(revision));
    }
    Ok(match global.image_mirror_revision {
        Some(revision) => images.mirrored(revision),
        None => images,
    })
}

/// Run the images command
pub fn run(global: &GlobalArgs, json: bool, raw: bool, sha: bool) -> Result<()> {
    let images = images(global, sha)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&images)?);
    } else if raw || sha {
        for (_, spec) in images.entries() {
            println!("{}", spec);
        }
    } else {
        display::print_images(&images.entries());
    }
    Ok(())
}
