//! Type definitions for node specification and state used in the cluster state store and configs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::common::{
    ObjectMeta, ResourceVector, CAPACITY_PLANNER_ORIGIN, LABEL_ORIGIN,
};

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeSpec {
    /// Set for nodes added by the capacity planner on top of the pre-existing cluster.
    #[serde(default)]
    pub synthetic: bool,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeStatus {
    // Total amount of resources available for pods, including extended resources.
    pub allocatable: ResourceVector,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeSpec,
    pub status: NodeStatus,
}

impl Node {
    pub fn new(name: &str, cpu: u64, memory: u64) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: Default::default(),
            status: NodeStatus {
                allocatable: ResourceVector::from_cpu_memory(cpu, memory),
            },
        }
    }

    pub fn with_extended_resource(mut self, name: &str, quantity: u64) -> Self {
        self.status.allocatable.insert(name, quantity);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_synthetic(&self) -> bool {
        self.spec.synthetic
    }

    /// Clones `template` into `count` synthetic nodes named `<template name>_<idx>`, idx from 1.
    /// Indices whose name is taken by one of `existing` are skipped.
    pub fn synthetic_from_template(template: &Node, count: u64, existing: &[Node]) -> Vec<Node> {
        let prefix = if template.metadata.name.is_empty() {
            "synthetic_node"
        } else {
            template.metadata.name.as_str()
        };
        let taken: HashSet<&str> = existing.iter().map(|node| node.name()).collect();
        (1u64..)
            .map(|idx| format!("{}_{}", prefix, idx))
            .filter(|name| !taken.contains(name.as_str()))
            .take(count as usize)
            .map(|name| {
                let mut node = template.clone();
                node.metadata.name = name;
                node.metadata
                    .labels
                    .insert(LABEL_ORIGIN.to_string(), CAPACITY_PLANNER_ORIGIN.to_string());
                node.spec.synthetic = true;
                node
            })
            .collect()
    }
}
