// src/renewal/policy.rs
use crate::cert::list::{APISERVER_ETCD_CLIENT_CERT_NAME, APISERVER_KUBELET_CLIENT_CERT_NAME};
use crate::cert::CertConfig;

/// Group bound to cluster-admin with no way to revoke it through RBAC.
pub const SYSTEM_PRIVILEGED_GROUP: &str = "system:masters";
/// Group bound to cluster-admin through a regular ClusterRoleBinding.
pub const CLUSTER_ADMINS_GROUP: &str = "kubeadm:cluster-admins";

pub type OrganizationTransform = fn(Vec<String>) -> Vec<String>;

/// Organization rewrites applied when a certificate is renewed. Certificates not listed
/// keep their organizations unchanged.
const CREDENTIAL_POLICIES: &[(&str, OrganizationTransform)] = &[
    (APISERVER_ETCD_CLIENT_CERT_NAME, remove_privileged_group),
    (APISERVER_KUBELET_CLIENT_CERT_NAME, downgrade_privileged_group),
];

fn identity(organization: Vec<String>) -> Vec<String> {
    organization
}

fn remove_privileged_group(organization: Vec<String>) -> Vec<String> {
    organization
        .into_iter()
        .filter(|group| group != SYSTEM_PRIVILEGED_GROUP)
        .collect()
}

/// Swaps the privileged group for the cluster-admins group, keeping a single
/// cluster-admins entry. Other groups are passed through as they are.
fn downgrade_privileged_group(organization: Vec<String>) -> Vec<String> {
    if !organization.iter().any(|group| group == SYSTEM_PRIVILEGED_GROUP) {
        return organization;
    }

    let mut result: Vec<String> = Vec::with_capacity(organization.len());
    let mut has_cluster_admins = false;
    for group in organization {
        if group == SYSTEM_PRIVILEGED_GROUP || group == CLUSTER_ADMINS_GROUP {
            if !has_cluster_admins {
                result.push(CLUSTER_ADMINS_GROUP.to_string());
                has_cluster_admins = true;
            }
        } else {
            result.push(group);
        }
    }
    result
}

pub fn organization_transform(cert_name: &str) -> OrganizationTransform {
    CREDENTIAL_POLICIES
        .iter()
        .find(|(name, _)| *name == cert_name)
        .map(|(_, transform)| *transform)
        .unwrap_or(identity)
}

pub fn apply_credential_policy(cert_name: &str, config: &mut CertConfig) {
    let transform = organization_transform(cert_name);
    config.organization = transform(std::mem::take(&mut config.organization));
}
