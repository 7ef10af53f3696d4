//! Embedded manifest store
//!
//! Templates are compiled into the binary and looked up by `component/file`
//! key. Every [`load`] call deserializes a fresh value, so callers always own
//! a ready-to-mutate copy.

use kube::Resource;
use kube::api::DynamicObject;
use phf::phf_map;
use serde::de::DeserializeOwned;

use crate::error::{ManifestError, Result};

static ASSETS: phf::Map<&'static str, &'static str> = phf_map! {
    "api/crd.yaml" => include_str!("../assets/api/crd.yaml"),

    "rte/namespace.yaml" => include_str!("../assets/rte/namespace.yaml"),
    "rte/serviceaccount.yaml" => include_str!("../assets/rte/serviceaccount.yaml"),
    "rte/clusterrole.yaml" => include_str!("../assets/rte/clusterrole.yaml"),
    "rte/clusterrolebinding.yaml" => include_str!("../assets/rte/clusterrolebinding.yaml"),
    "rte/configmap.yaml" => include_str!("../assets/rte/configmap.yaml"),
    "rte/daemonset.yaml" => include_str!("../assets/rte/daemonset.yaml"),
    "rte/scc.yaml" => include_str!("../assets/rte/scc.yaml"),
    "rte/hook.json.j2" => include_str!("../assets/rte/hook.json.j2"),
    "rte/notify.sh.j2" => include_str!("../assets/rte/notify.sh.j2"),
    "rte/selinux.cil.j2" => include_str!("../assets/rte/selinux.cil.j2"),
    "rte/machineconfig.yaml" => include_str!("../assets/rte/machineconfig.yaml"),

    "nfd/namespace.yaml" => include_str!("../assets/nfd/namespace.yaml"),
    "nfd/serviceaccount.yaml" => include_str!("../assets/nfd/serviceaccount.yaml"),
    "nfd/clusterrole.yaml" => include_str!("../assets/nfd/clusterrole.yaml"),
    "nfd/clusterrolebinding.yaml" => include_str!("../assets/nfd/clusterrolebinding.yaml"),
    "nfd/daemonset.yaml" => include_str!("../assets/nfd/daemonset.yaml"),

    "sched/namespace.yaml" => include_str!("../assets/sched/namespace.yaml"),
    "sched/serviceaccount.yaml" => include_str!("../assets/sched/serviceaccount.yaml"),
    "sched/clusterrole.yaml" => include_str!("../assets/sched/clusterrole.yaml"),
    "sched/clusterrolebinding-kube-scheduler.yaml" => include_str!("../assets/sched/clusterrolebinding-kube-scheduler.yaml"),
    "sched/clusterrolebinding.yaml" => include_str!("../assets/sched/clusterrolebinding.yaml"),
    "sched/role.yaml" => include_str!("../assets/sched/role.yaml"),
    "sched/rolebinding.yaml" => include_str!("../assets/sched/rolebinding.yaml"),
    "sched/configmap.yaml" => include_str!("../assets/sched/configmap.yaml"),
    "sched/config.yaml" => include_str!("../assets/sched/config.yaml"),
    "sched/deployment.yaml" => include_str!("../assets/sched/deployment.yaml"),
    "sched/controller-serviceaccount.yaml" => include_str!("../assets/sched/controller-serviceaccount.yaml"),
    "sched/controller-clusterrole.yaml" => include_str!("../assets/sched/controller-clusterrole.yaml"),
    "sched/controller-clusterrolebinding.yaml" => include_str!("../assets/sched/controller-clusterrolebinding.yaml"),
    "sched/controller-deployment.yaml" => include_str!("../assets/sched/controller-deployment.yaml"),

    "common/networkpolicy-default-deny.yaml" => include_str!("../assets/common/networkpolicy-default-deny.yaml"),
    "common/networkpolicy-apiserver.yaml" => include_str!("../assets/common/networkpolicy-apiserver.yaml"),
};

/// Raw text of an embedded asset
pub fn get(key: &str) -> Result<&'static str> {
    ASSETS
        .get(key)
        .copied()
        .ok_or_else(|| ManifestError::MissingAsset(key.to_string()))
}

fn invalid(key: &str, message: impl Into<String>) -> ManifestError {
    ManifestError::InvalidAsset {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse<T: DeserializeOwned>(key: &str) -> Result<T> {
    serde_yaml::from_str(get(key)?).map_err(|e| invalid(key, e.to_string()))
}

/// Deserialize an embedded asset into an owned typed object
///
/// The document must declare the `apiVersion` and `kind` of `K`.
pub fn load<K>(key: &str) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let obj: DynamicObject = load_dynamic(key)?;
    let types = obj.types.as_ref().ok_or_else(|| invalid(key, "missing apiVersion or kind"))?;
    let (api_version, kind) = (K::api_version(&()), K::kind(&()));
    if types.api_version != api_version || types.kind != kind {
        return Err(invalid(
            key,
            format!(
                "expected {} {}, found {} {}",
                api_version, kind, types.api_version, types.kind
            ),
        ));
    }
    parse(key)
}

/// Deserialize an embedded asset of a kind without a typed binding
pub fn load_dynamic(key: &str) -> Result<DynamicObject> {
    let obj: DynamicObject = parse(key)?;
    if obj.types.is_none() {
        return Err(invalid(key, "missing apiVersion or kind"));
    }
    Ok(obj)
}

/// All asset keys, sorted
pub fn keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = ASSETS.keys().copied().collect();
    keys.sort_unstable();
    keys
}
