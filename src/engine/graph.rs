use std::collections::HashMap;

use thiserror::Error;

use crate::models::workflow::{NodeDef, WorkflowDefinition};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("workflow graph contains a cycle through node '{node_id}'")]
    Cycle { node_id: String },
    #[error("edge references unknown node '{node_id}'")]
    UnknownNode { node_id: String },
}

/// Directed view over a workflow definition. Node and edge declaration order
/// is preserved so scheduling is deterministic for a given definition.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: Vec<NodeDef>,
    upstream: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl WorkflowGraph {
    pub fn from_definition(definition: &WorkflowDefinition) -> Result<Self, GraphError> {
        let nodes = definition.nodes.clone();
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index.insert(node.id.clone(), i);
        }

        let mut upstream = vec![Vec::new(); nodes.len()];
        for edge in &definition.edges {
            let source = *index.get(&edge.source).ok_or_else(|| GraphError::UnknownNode {
                node_id: edge.source.clone(),
            })?;
            let target = *index.get(&edge.target).ok_or_else(|| GraphError::UnknownNode {
                node_id: edge.target.clone(),
            })?;
            upstream[target].push(source);
        }

        Ok(Self { nodes, upstream })
    }

    /// Topological order over every node. Each node's upstream dependencies
    /// are emitted before the node itself; unconstrained nodes keep their
    /// declaration order. Definitions with a cycle are rejected rather than
    /// partially run.
    pub fn execution_order(&self) -> Result<Vec<&NodeDef>, GraphError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        for start in 0..self.nodes.len() {
            if marks[start] == Mark::Unvisited {
                self.visit(start, &mut marks, &mut order)?;
            }
        }

        Ok(order.into_iter().map(|i| &self.nodes[i]).collect())
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> Result<(), GraphError> {
        marks[node] = Mark::InProgress;
        for &dep in &self.upstream[node] {
            match marks[dep] {
                Mark::InProgress => {
                    return Err(GraphError::Cycle {
                        node_id: self.nodes[dep].id.clone(),
                    })
                }
                Mark::Unvisited => self.visit(dep, marks, order)?,
                Mark::Done => {}
            }
        }
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }
}
