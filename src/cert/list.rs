// src/cert/list.rs
use super::types::KubeadmCert;
use super::CertOperationError;
use std::collections::BTreeMap;

pub const CA_CERT_NAME: &str = "ca";
pub const FRONT_PROXY_CA_CERT_NAME: &str = "front-proxy-ca";
pub const ETCD_CA_CERT_NAME: &str = "etcd-ca";

pub const CA_BASE_NAME: &str = "ca";
pub const FRONT_PROXY_CA_BASE_NAME: &str = "front-proxy-ca";
pub const ETCD_CA_BASE_NAME: &str = "etcd/ca";

pub const APISERVER_ETCD_CLIENT_CERT_NAME: &str = "apiserver-etcd-client";
pub const APISERVER_KUBELET_CLIENT_CERT_NAME: &str = "apiserver-kubelet-client";

pub const ROOT_CA: KubeadmCert = KubeadmCert {
    name: CA_CERT_NAME,
    long_name: "self-signed Kubernetes CA to provision identities for other Kubernetes components",
    base_name: CA_BASE_NAME,
    ca_name: "",
};

pub const API_SERVER: KubeadmCert = KubeadmCert {
    name: "apiserver",
    long_name: "certificate for serving the Kubernetes API",
    base_name: "apiserver",
    ca_name: CA_CERT_NAME,
};

pub const KUBELET_CLIENT: KubeadmCert = KubeadmCert {
    name: APISERVER_KUBELET_CLIENT_CERT_NAME,
    long_name: "certificate for the API server to connect to kubelet",
    base_name: "apiserver-kubelet-client",
    ca_name: CA_CERT_NAME,
};

pub const FRONT_PROXY_CA: KubeadmCert = KubeadmCert {
    name: FRONT_PROXY_CA_CERT_NAME,
    long_name: "self-signed CA to provision identities for front proxy",
    base_name: FRONT_PROXY_CA_BASE_NAME,
    ca_name: "",
};

pub const FRONT_PROXY_CLIENT: KubeadmCert = KubeadmCert {
    name: "front-proxy-client",
    long_name: "certificate for the front proxy client",
    base_name: "front-proxy-client",
    ca_name: FRONT_PROXY_CA_CERT_NAME,
};

pub const ETCD_CA: KubeadmCert = KubeadmCert {
    name: ETCD_CA_CERT_NAME,
    long_name: "self-signed CA to provision identities for etcd",
    base_name: ETCD_CA_BASE_NAME,
    ca_name: "",
};

pub const ETCD_SERVER: KubeadmCert = KubeadmCert {
    name: "etcd-server",
    long_name: "certificate for serving etcd",
    base_name: "etcd/server",
    ca_name: ETCD_CA_CERT_NAME,
};

pub const ETCD_PEER: KubeadmCert = KubeadmCert {
    name: "etcd-peer",
    long_name: "certificate for etcd nodes to communicate with each other",
    base_name: "etcd/peer",
    ca_name: ETCD_CA_CERT_NAME,
};

pub const ETCD_HEALTHCHECK_CLIENT: KubeadmCert = KubeadmCert {
    name: "etcd-healthcheck-client",
    long_name: "certificate for liveness probes to healthcheck etcd",
    base_name: "etcd/healthcheck-client",
    ca_name: ETCD_CA_CERT_NAME,
};

pub const APISERVER_ETCD_CLIENT: KubeadmCert = KubeadmCert {
    name: APISERVER_ETCD_CLIENT_CERT_NAME,
    long_name: "certificate the apiserver uses to access etcd",
    base_name: "apiserver-etcd-client",
    ca_name: ETCD_CA_CERT_NAME,
};

/// Kubeconfig files carrying a client certificate signed by the cluster CA.
/// `kubelet.conf` is absent on purpose: the kubelet rotates its own client certificate.
pub const KUBECONFIG_FILES: [(&str, &str); 4] = [
    (
        "admin.conf",
        "certificate embedded in the kubeconfig file for the admin to use and for kubeadm itself",
    ),
    (
        "super-admin.conf",
        "certificate embedded in the kubeconfig file for the super-admin",
    ),
    (
        "controller-manager.conf",
        "certificate embedded in the kubeconfig file for the controller manager to use",
    ),
    (
        "scheduler.conf",
        "certificate embedded in the kubeconfig file for the scheduler manager to use",
    ),
];

/// Every CA and certificate of a control plane with a local etcd.
pub fn default_cert_list() -> Vec<KubeadmCert> {
    vec![
        ROOT_CA,
        API_SERVER,
        KUBELET_CLIENT,
        FRONT_PROXY_CA,
        FRONT_PROXY_CLIENT,
        ETCD_CA,
        ETCD_SERVER,
        ETCD_PEER,
        ETCD_HEALTHCHECK_CLIENT,
        APISERVER_ETCD_CLIENT,
    ]
}

/// The catalog for a control plane whose etcd is managed elsewhere.
pub fn certs_without_etcd() -> Vec<KubeadmCert> {
    vec![
        ROOT_CA,
        API_SERVER,
        KUBELET_CLIENT,
        FRONT_PROXY_CA,
        FRONT_PROXY_CLIENT,
    ]
}

/// Groups the leaf certificates of `certs` under the CA that signs them. Fails when a
/// certificate refers to a CA missing from the list.
pub fn cert_tree(
    certs: &[KubeadmCert],
) -> Result<BTreeMap<&'static str, (KubeadmCert, Vec<KubeadmCert>)>, CertOperationError> {
    let mut tree: BTreeMap<&'static str, (KubeadmCert, Vec<KubeadmCert>)> = certs
        .iter()
        .filter(|cert| cert.is_ca())
        .map(|ca| (ca.name, (ca.clone(), Vec::new())))
        .collect();

    for cert in certs.iter().filter(|cert| !cert.is_ca()) {
        match tree.get_mut(cert.ca_name) {
            Some((_, leaves)) => leaves.push(cert.clone()),
            None => {
                return Err(CertOperationError::Configuration(format!(
                    "certificate {} references unknown CA {}",
                    cert.name, cert.ca_name
                )))
            }
        }
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tree_has_three_cas() {
        let tree = cert_tree(&default_cert_list()).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree[CA_CERT_NAME].1.len(), 2);
        assert_eq!(tree[FRONT_PROXY_CA_CERT_NAME].1.len(), 1);
        assert_eq!(tree[ETCD_CA_CERT_NAME].1.len(), 4);
    }

    #[test]
    fn external_etcd_tree_has_no_etcd_ca() {
        let tree = cert_tree(&certs_without_etcd()).unwrap();

        assert!(!tree.contains_key(ETCD_CA_CERT_NAME));
        let leaves: usize = tree.values().map(|(_, certs)| certs.len()).sum();
        assert_eq!(leaves, 3);
    }

    #[test]
    fn dangling_ca_reference_is_rejected() {
        let err = cert_tree(&[API_SERVER]).unwrap_err();
        assert!(matches!(err, CertOperationError::Configuration(_)));
    }

    #[test]
    fn etcd_certs_live_under_etcd_dir() {
        for cert in default_cert_list()
            .iter()
            .filter(|c| c.ca_name == ETCD_CA_CERT_NAME && c.name != APISERVER_ETCD_CLIENT_CERT_NAME)
        {
            assert!(cert.base_name.starts_with("etcd/"), "{}", cert.name);
        }
    }
}
