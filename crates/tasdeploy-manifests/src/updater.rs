//! The topology updater as a closed choice between RTE and NFD

use kube::api::DynamicObject;
use tasdeploy_core::{Platform, PlatformVersion, UpdaterKind, UpdaterOptions};

use crate::error::Result;
use crate::nfd::NfdManifests;
use crate::objects::ManifestSet;
use crate::rte::RteManifests;

#[derive(Debug, Clone)]
pub enum UpdaterManifests {
    Rte(RteManifests),
    Nfd(NfdManifests),
}

impl UpdaterManifests {
    pub fn load(
        kind: UpdaterKind,
        platform: Platform,
        version: &PlatformVersion,
        namespace: Option<&str>,
    ) -> Result<Self> {
        Ok(match kind {
            UpdaterKind::Rte => Self::Rte(RteManifests::load(platform, version, namespace)?),
            UpdaterKind::Nfd => Self::Nfd(NfdManifests::load(platform, version, namespace)?),
        })
    }

    pub fn kind(&self) -> UpdaterKind {
        match self {
            Self::Rte(_) => UpdaterKind::Rte,
            Self::Nfd(_) => UpdaterKind::Nfd,
        }
    }
}

impl ManifestSet for UpdaterManifests {
    type Options = UpdaterOptions;

    fn render(&self, options: &UpdaterOptions) -> Result<Self> {
        Ok(match self {
            Self::Rte(m) => Self::Rte(m.render(options)?),
            Self::Nfd(m) => Self::Nfd(m.render(options)?),
        })
    }

    fn objects(&self) -> Result<Vec<DynamicObject>> {
        match self {
            Self::Rte(m) => m.objects(),
            Self::Nfd(m) => m.objects(),
        }
    }

    fn namespace(&self) -> Option<&str> {
        match self {
            Self::Rte(m) => m.namespace(),
            Self::Nfd(m) => m.namespace(),
        }
    }
}
