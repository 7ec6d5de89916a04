//! Default placement algorithm: filter and score plugins grouped into scheduler profiles, the way
//! kube-scheduler works.

use std::collections::HashMap;

use serde::Deserialize;

use crate::core::common::DEFAULT_SCHEDULER_NAME;
use crate::core::pod::Pod;
use crate::core::scheduler::interface::{NodeInfo, PodSchedulingAlgorithm, ScheduleError};
use crate::core::scheduler::plugin::{Diagnosis, PluginType, PLUGIN_REGISTRY};

#[derive(Clone, Debug)]
pub struct KubeScheduler {
    // Profiles are scheduling profiles that kube-scheduler supports. Pods can
    // choose to be scheduled under a particular profile by setting its associated
    // scheduler name in pod spec. Pods that don't specify any scheduler name are scheduled
    // with the "default_scheduler" profile, if present here.
    pub config: KubeSchedulerConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct KubeSchedulerConfig {
    // Map from scheduler name to scheduler profile
    pub profiles: HashMap<String, KubeSchedulerProfile>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct KubeSchedulerProfile {
    pub plugins: Plugins,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Plugins {
    // Each extension point is a list of enabled plugins which are registered globally in plugin registry.
    #[serde(default)]
    pub filter: Vec<Plugin>,
    #[serde(default)]
    pub score: Vec<Plugin>,
}

// Plugin specifies a plugin name and its weight when applicable.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Plugin {
    pub name: String,
    // Weight is used only for Score plugins.
    pub weight: Option<f64>,
}

pub fn default_kube_scheduler_profile() -> KubeSchedulerProfile {
    KubeSchedulerProfile {
        plugins: Plugins {
            filter: vec![Plugin {
                name: "Fit".to_string(),
                weight: None,
            }],
            score: vec![Plugin {
                name: "LeastAllocatedResources".to_string(),
                weight: Some(1.0),
            }],
        },
    }
}

pub fn default_kube_scheduler_config() -> KubeSchedulerConfig {
    KubeSchedulerConfig {
        profiles: HashMap::from([(
            DEFAULT_SCHEDULER_NAME.to_string(),
            default_kube_scheduler_profile(),
        )]),
    }
}

impl Default for KubeScheduler {
    fn default() -> Self {
        Self::new(default_kube_scheduler_config())
    }
}

impl KubeScheduler {
    pub fn new(config: KubeSchedulerConfig) -> Self {
        Self { config }
    }

    fn profile(&self, pod: &Pod) -> Result<&KubeSchedulerProfile, ScheduleError> {
        let pod_scheduler = if pod.spec.scheduler_name.is_empty() {
            DEFAULT_SCHEDULER_NAME
        } else {
            &pod.spec.scheduler_name
        };
        self.config
            .profiles
            .get(pod_scheduler)
            .ok_or_else(|| ScheduleError::UnknownProfile(pod_scheduler.to_string()))
    }

    fn schedule_one(&self, pod: &Pod, nodes: &[NodeInfo]) -> Result<String, ScheduleError> {
        let profile = self.profile(pod)?;

        if nodes.is_empty() {
            return Err(ScheduleError::NoNodesInCluster);
        }

        let mut filtered_nodes: Vec<&NodeInfo> = nodes.iter().collect();
        let mut diagnosis = Diagnosis::new();

        for filter in profile.plugins.filter.iter() {
            match PLUGIN_REGISTRY.get(filter.name.as_str()) {
                Some(PluginType::FilterPlugin(filter_plugin)) => {
                    filtered_nodes = filter_plugin.filter(pod, filtered_nodes, &mut diagnosis);
                }
                Some(_) => {
                    return Err(ScheduleError::WrongPluginType {
                        name: filter.name.clone(),
                        expected: "filter".to_string(),
                    })
                }
                None => return Err(ScheduleError::UnknownPlugin(filter.name.clone())),
            }
        }

        if filtered_nodes.is_empty() {
            return Err(ScheduleError::NoSufficientResources {
                total_nodes: nodes.len(),
                insufficient: diagnosis,
            });
        }

        let mut node_scores = vec![0.0; filtered_nodes.len()];

        for scorer in profile.plugins.score.iter() {
            match PLUGIN_REGISTRY.get(scorer.name.as_str()) {
                Some(PluginType::ScorePlugin(score_plugin)) => {
                    let weight = scorer.weight.unwrap_or(1.0);
                    for (node, total) in filtered_nodes.iter().zip(node_scores.iter_mut()) {
                        *total += score_plugin.score(pod, node) * weight;
                    }
                }
                Some(_) => {
                    return Err(ScheduleError::WrongPluginType {
                        name: scorer.name.clone(),
                        expected: "score".to_string(),
                    })
                }
                None => return Err(ScheduleError::UnknownPlugin(scorer.name.clone())),
            }
        }

        // Strictly greater score wins, so ties go to the first node in name order.
        let mut best = 0;
        for (idx, score) in node_scores.iter().enumerate() {
            if *score > node_scores[best] {
                best = idx;
            }
        }

        Ok(filtered_nodes[best].name().to_string())
    }
}

impl PodSchedulingAlgorithm for KubeScheduler {
    fn scheduler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    fn schedule_one(&self, pod: &Pod, nodes: &[NodeInfo]) -> Result<String, ScheduleError> {
        KubeScheduler::schedule_one(self, pod, nodes)
    }
}
