//! Config fields definitions for the capacity planning simulation.

use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::core::node::Node;
use crate::core::object::InertObject;
use crate::core::pod::Pod;
use crate::core::scheduler::kube_scheduler::{KubeScheduler, KubeSchedulerConfig};
use crate::error::ConfigError;
use crate::metrics::policy::{
    parse_ceiling, UtilizationPolicy, ENV_MAX_CPU, ENV_MAX_EXTENDED, ENV_MAX_MEMORY,
};
use crate::simulator::{AppResource, ResourceTypes};

#[derive(Debug, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub sim_name: String,
    /// If not set default output of logs is stdout/stderr
    pub logs_filepath: Option<String>,
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Applications are scheduled in the listed order, after the cluster's own pods.
    #[serde(default)]
    pub apps: Vec<AppConfig>,
    /// Template for nodes added by the capacity planner.
    pub new_node: Option<Node>,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Scheduler profiles, the default profile is used if not set.
    pub scheduler: Option<KubeSchedulerConfig>,
}

#[derive(Clone, Default, Debug, Deserialize, PartialEq)]
pub struct ClusterConfig {
    #[serde(default)]
    pub node_groups: Vec<NodeGroup>,
    /// Pods which are already in the cluster. Pods with an assigned node are taken as running.
    #[serde(default)]
    pub pods: Vec<PodGroup>,
    #[serde(default)]
    pub objects: Vec<InertObject>,
}

#[derive(Clone, Default, Debug, Deserialize, PartialEq)]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub pods: Vec<PodGroup>,
    #[serde(default)]
    pub objects: Vec<InertObject>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NodeGroup {
    // If node count is not none and node's metadata has name, then it's taken as a prefix of all nodes
    // in a group.
    // If node count is none or 1 and node's metadata has name, then it's a single node and its name is set
    // to metadata name.
    // If metadata has got no name, then prefix default_node(_<idx>)? is used.
    pub node_count: Option<u64>,
    pub node_template: Node,
}

// Same naming rules as for node groups, with default_pod prefix.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PodGroup {
    pub pod_count: Option<u64>,
    pub pod_template: Pod,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CeilingValue {
    Integer(i64),
    Text(String),
}

impl CeilingValue {
    fn raw(&self) -> String {
        match self {
            CeilingValue::Integer(value) => value.to_string(),
            CeilingValue::Text(text) => text.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExtendedPolicyConfig {
    pub resource: String,
    pub max: Option<CeilingValue>,
}

/// Utilization ceilings in percents. Environment variables override the values set here.
#[derive(Clone, Default, Debug, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub max_cpu: Option<CeilingValue>,
    pub max_memory: Option<CeilingValue>,
    pub extended: Option<ExtendedPolicyConfig>,
}

/// Expands `(count, template)` groups into named objects, see [`NodeGroup`] for the naming rules.
fn expand_groups<T: Clone>(
    groups: impl Iterator<Item = (Option<u64>, T)>,
    name_of: impl Fn(&mut T) -> &mut String,
    default_prefix: &str,
) -> Vec<T> {
    let mut objects = Vec::new();
    let mut total = 0;
    for (count, mut template) in groups {
        let count_in_group = count.unwrap_or(1);
        let template_name = name_of(&mut template).clone();

        if count_in_group == 1 && !template_name.is_empty() {
            // use name prefix as-is without suffix
            objects.push(template);
            continue;
        }
        let name_prefix = if template_name.is_empty() {
            default_prefix.to_string()
        } else {
            template_name
        };

        for _ in 0..count_in_group {
            let mut object = template.clone();
            *name_of(&mut object) = format!("{}_{}", name_prefix, total);
            objects.push(object);
            total += 1;
        }
    }
    objects
}

fn expand_pod_groups(groups: &[PodGroup]) -> Vec<Pod> {
    expand_groups(
        groups
            .iter()
            .map(|group| (group.pod_count, group.pod_template.clone())),
        |pod| &mut pod.metadata.name,
        "default_pod",
    )
}

fn ceiling_from(
    name: &str,
    configured: Option<&CeilingValue>,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Option<u64>, ConfigError> {
    let raw = env(name).or_else(|| configured.map(CeilingValue::raw));
    raw.map(|raw| parse_ceiling(name, &raw)).transpose()
}

impl SimulationConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Nodes, pods and ancillary objects of the pre-existing cluster.
    pub fn cluster_resources(&self) -> ResourceTypes {
        let nodes = expand_groups(
            self.cluster
                .node_groups
                .iter()
                .map(|group| (group.node_count, group.node_template.clone())),
            |node| &mut node.metadata.name,
            "default_node",
        );
        ResourceTypes {
            nodes,
            pods: expand_pod_groups(&self.cluster.pods),
            objects: self.cluster.objects.clone(),
        }
    }

    pub fn app_resources(&self) -> Vec<AppResource> {
        self.apps
            .iter()
            .map(|app| AppResource {
                name: app.name.clone(),
                resource: ResourceTypes {
                    nodes: vec![],
                    pods: expand_pod_groups(&app.pods),
                    objects: app.objects.clone(),
                },
            })
            .collect()
    }

    pub fn scheduler_algorithm(&self) -> KubeScheduler {
        match &self.scheduler {
            Some(config) => KubeScheduler::new(config.clone()),
            None => KubeScheduler::default(),
        }
    }

    /// Utilization policy from the config, overridden by `MAX_CPU_OCCUPANCY`,
    /// `MAX_MEMORY_OCCUPANCY` and `MAX_EXTENDED_OCCUPANCY` environment variables.
    pub fn policy(&self) -> Result<UtilizationPolicy, ConfigError> {
        self.policy_with_env(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
    }

    pub fn policy_with_env(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<UtilizationPolicy, ConfigError> {
        let mut policy = UtilizationPolicy::default();
        if let Some(max_cpu) = ceiling_from(ENV_MAX_CPU, self.policy.max_cpu.as_ref(), &env)? {
            policy = policy.with_max_cpu(max_cpu);
        }
        if let Some(max_memory) =
            ceiling_from(ENV_MAX_MEMORY, self.policy.max_memory.as_ref(), &env)?
        {
            policy = policy.with_max_memory(max_memory);
        }
        match &self.policy.extended {
            Some(extended) => {
                if let Some(max) = ceiling_from(ENV_MAX_EXTENDED, extended.max.as_ref(), &env)? {
                    policy = policy.with_extended(&extended.resource, max);
                }
            }
            None => {
                if env(ENV_MAX_EXTENDED).is_some() {
                    warn!(
                        "{} is set, but no extended resource is configured in policy",
                        ENV_MAX_EXTENDED
                    );
                }
            }
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::policy::UNCONSTRAINED;

    fn config() -> SimulationConfig {
        SimulationConfig::from_yaml(
            r#"
            sim_name: "planner_test"
            cluster:
              node_groups:
              - node_count: 2
                node_template:
                  metadata:
                    name: worker
                  status:
                    allocatable:
                      cpu: "2"
                      memory: 4Gi
              - node_template:
                  metadata:
                    name: master
                  status:
                    allocatable:
                      cpu: 4000
                      memory: 8Gi
              - node_count: 1
                node_template:
                  status:
                    allocatable:
                      cpu: "1"
                      memory: 1Gi
              objects:
              - kind: Service
                metadata:
                  name: web
                spec:
                  ports: [80]
            apps:
            - name: shop
              pods:
              - pod_count: 3
                pod_template:
                  metadata:
                    name: cart
                  spec:
                    resources:
                      requests:
                        cpu: 500m
                        memory: 512Mi
            new_node:
              metadata:
                name: new_node
              status:
                allocatable:
                  cpu: "2"
                  memory: 4Gi
            policy:
              max_cpu: 50
              max_memory: "70"
              extended:
                resource: gpu-mem
                max: 200
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_cluster_resources_follow_group_naming() {
        let cluster = config().cluster_resources();
        let names: Vec<&str> = cluster.nodes.iter().map(|node| node.name()).collect();
        assert_eq!(vec!["worker_0", "worker_1", "master", "default_node_2"], names);
        assert_eq!(2000, cluster.nodes[0].status.allocatable.cpu());
        assert_eq!(4 << 30, cluster.nodes[0].status.allocatable.memory());
        assert_eq!(1000, cluster.nodes[3].status.allocatable.cpu());
        assert_eq!(1, cluster.objects.len());
        assert_eq!("Service", cluster.objects[0].kind);
    }

    #[test]
    fn test_app_resources() {
        let apps = config().app_resources();
        assert_eq!(1, apps.len());
        assert_eq!("shop", apps[0].name);
        let pods = &apps[0].resource.pods;
        assert_eq!(3, pods.len());
        assert_eq!("cart_2", pods[2].metadata.name);
        assert_eq!(500, pods[0].requests().cpu());
        assert_eq!(512 << 20, pods[0].requests().memory());
    }

    #[test]
    fn test_policy_with_env_overrides() {
        let config = config();
        let policy = config.policy_with_env(|_| None).unwrap();
        assert_eq!(50, policy.max_cpu);
        assert_eq!(70, policy.max_memory);
        // out of range extended ceiling falls back to unconstrained
        assert_eq!(UNCONSTRAINED, policy.extended.unwrap().max);

        let policy = config
            .policy_with_env(|name| (name == ENV_MAX_CPU).then(|| "80".to_string()))
            .unwrap();
        assert_eq!(80, policy.max_cpu);

        let error = config
            .policy_with_env(|name| (name == ENV_MAX_MEMORY).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(error, ConfigError::MalformedCeiling { .. }));
    }

    #[test]
    fn test_missing_policy_is_unconstrained() {
        let config = SimulationConfig::from_yaml("sim_name: empty").unwrap();
        assert_eq!(
            UtilizationPolicy::default(),
            config.policy_with_env(|_| None).unwrap()
        );
        assert!(config.cluster_resources().nodes.is_empty());
        assert!(config.new_node.is_none());
    }

    #[test]
    fn test_invalid_quantity_is_parse_error() {
        let result = SimulationConfig::from_yaml(
            r#"
            sim_name: broken
            new_node:
              status:
                allocatable:
                  cpu: two
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
