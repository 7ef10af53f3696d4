//! The NodeResourceTopology API definition

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use tasdeploy_core::{ApiOptions, Platform, PlatformVersion};

use crate::assets;
use crate::error::Result;
use crate::objects::{ManifestSet, to_dynamic};
use crate::render::ensure_known;

/// Name of the NodeResourceTopology CRD
pub const CRD_NAME: &str = "noderesourcetopologies.topology.node.k8s.io";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiManifests {
    pub crd: CustomResourceDefinition,
}

impl ApiManifests {
    /// Load the API templates for a platform
    ///
    /// The CRD is the same everywhere; the platform is still checked so an
    /// undetected cluster never reaches rendering.
    pub fn load(platform: Platform, _version: &PlatformVersion) -> Result<Self> {
        ensure_known(platform)?;
        Ok(Self {
            crd: assets::load("api/crd.yaml")?,
        })
    }
}

impl ManifestSet for ApiManifests {
    type Options = ApiOptions;

    fn render(&self, _options: &ApiOptions) -> Result<Self> {
        Ok(self.clone())
    }

    fn objects(&self) -> Result<Vec<DynamicObject>> {
        Ok(vec![to_dynamic(&self.crd)?])
    }

    fn namespace(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManifestError;

    #[test]
    fn test_load_crd() {
        let api = ApiManifests::load(Platform::Kubernetes, &PlatformVersion::new(1, 28)).unwrap();
        assert_eq!(api.crd.metadata.name.as_deref(), Some(CRD_NAME));
        assert_eq!(api.crd.spec.scope, "Cluster");
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let err = ApiManifests::load(Platform::Unknown, &PlatformVersion::new(1, 28)).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedPlatform(_)));
    }

    #[test]
    fn test_objects_are_cluster_scoped() {
        let api = ApiManifests::load(Platform::OpenShift, &PlatformVersion::new(4, 14)).unwrap();
        let objs = api.render(&ApiOptions::default()).unwrap().objects().unwrap();
        assert_eq!(objs.len(), 1);
        assert!(objs[0].metadata.namespace.is_none());
        assert_eq!(objs[0].types.as_ref().unwrap().kind, "CustomResourceDefinition");
    }
}
