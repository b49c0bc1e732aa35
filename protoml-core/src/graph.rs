//! Pipeline graph reconstruction.
//!
//! The graph is rebuilt from the record store on every call. Vertices are
//! data groups, induced transforms and states; edges follow data flow:
//! inputs point into a transform, outputs point out of it. Any dangling
//! reference aborts the build.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use tracing::debug;

use crate::error::{IntegrityError, Result};
use crate::records::{RecordKind, RecordStore, RecordStoreExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexKind {
    DataGroup,
    InducedTransform,
    State,
}

impl VertexKind {
    fn record_kind(self) -> RecordKind {
        match self {
            VertexKind::DataGroup => RecordKind::DataGroup,
            VertexKind::InducedTransform => RecordKind::InducedTransform,
            VertexKind::State => RecordKind::State,
        }
    }
}

impl fmt::Display for VertexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.record_kind(), f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Vertex {
    pub kind: VertexKind,
    pub id: String,
}

impl Vertex {
    pub fn new(kind: VertexKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: Vertex,
    pub to: Vertex,
}

/// Snapshot of the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineGraph {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
}

impl PipelineGraph {
    /// Petgraph view of the snapshot, plus the vertex to node index map.
    pub fn to_digraph(&self) -> (DiGraph<Vertex, ()>, HashMap<Vertex, NodeIndex>) {
        let mut graph = DiGraph::with_capacity(self.vertices.len(), self.edges.len());
        let mut index = HashMap::with_capacity(self.vertices.len());
        for vertex in &self.vertices {
            index
                .entry(vertex.clone())
                .or_insert_with(|| graph.add_node(vertex.clone()));
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
                graph.add_edge(from, to, ());
            }
        }
        (graph, index)
    }

    /// Induced transform ids in an order where every producer precedes its
    /// consumers.
    pub fn execution_order(&self) -> std::result::Result<Vec<String>, IntegrityError> {
        let (graph, _) = self.to_digraph();
        let sorted = toposort(&graph, None).map_err(|cycle| IntegrityError::Cycle {
            vertex_id: graph[cycle.node_id()].id.clone(),
        })?;
        Ok(sorted
            .into_iter()
            .map(|node| &graph[node])
            .filter(|vertex| vertex.kind == VertexKind::InducedTransform)
            .map(|vertex| vertex.id.clone())
            .collect())
    }

    /// Induced transforms writing any data group or state `task_id` reads.
    pub fn producers_of(&self, task_id: &str) -> Vec<String> {
        let consumer = Vertex::new(VertexKind::InducedTransform, task_id);
        let inputs: BTreeSet<&Vertex> = self
            .edges
            .iter()
            .filter(|edge| edge.to == consumer)
            .map(|edge| &edge.from)
            .collect();
        let producers: BTreeSet<&str> = self
            .edges
            .iter()
            .filter(|edge| {
                edge.from.kind == VertexKind::InducedTransform && inputs.contains(&edge.to)
            })
            .map(|edge| edge.from.id.as_str())
            .collect();
        producers.into_iter().map(str::to_string).collect()
    }
}

/// Reads every data group, induced transform and state out of the store and
/// links them.
pub struct GraphBuilder<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    pub fn build(&self) -> Result<PipelineGraph> {
        let data_ids = self.store.get_all(RecordKind::DataGroup)?;
        let transform_ids = self.store.get_all(RecordKind::InducedTransform)?;
        let state_ids = self.store.get_all(RecordKind::State)?;

        let data_set: BTreeSet<&str> = data_ids.iter().map(String::as_str).collect();
        let state_set: BTreeSet<&str> = state_ids.iter().map(String::as_str).collect();

        let mut graph = PipelineGraph::default();
        graph.vertices.extend(
            data_ids
                .iter()
                .map(|id| Vertex::new(VertexKind::DataGroup, id.as_str())),
        );
        graph.vertices.extend(
            transform_ids
                .iter()
                .map(|id| Vertex::new(VertexKind::InducedTransform, id.as_str())),
        );
        graph.vertices.extend(
            state_ids
                .iter()
                .map(|id| Vertex::new(VertexKind::State, id.as_str())),
        );

        for transform_id in &transform_ids {
            let induced = self.store.get_induced_transform(transform_id)?;
            let task = Vertex::new(VertexKind::InducedTransform, transform_id.as_str());

            for data_id in induced.input_data_ids() {
                if !data_set.contains(data_id) {
                    return Err(IntegrityError::MissingInputData {
                        transform_id: transform_id.clone(),
                        data_id: data_id.to_string(),
                    }
                    .into());
                }
                graph.edges.push(Edge {
                    from: Vertex::new(VertexKind::DataGroup, data_id),
                    to: task.clone(),
                });
            }
            for data_id in induced.output_data_ids() {
                if !data_set.contains(data_id) {
                    return Err(IntegrityError::MissingOutputData {
                        transform_id: transform_id.clone(),
                        data_id: data_id.to_string(),
                    }
                    .into());
                }
                graph.edges.push(Edge {
                    from: task.clone(),
                    to: Vertex::new(VertexKind::DataGroup, data_id),
                });
            }
            for state_id in induced.input_state_ids() {
                if !state_set.contains(state_id) {
                    return Err(IntegrityError::MissingInputState {
                        transform_id: transform_id.clone(),
                        state_id: state_id.to_string(),
                    }
                    .into());
                }
                graph.edges.push(Edge {
                    from: Vertex::new(VertexKind::State, state_id),
                    to: task.clone(),
                });
            }
            for state_id in induced.output_state_ids() {
                if !state_set.contains(state_id) {
                    return Err(IntegrityError::MissingOutputState {
                        transform_id: transform_id.clone(),
                        state_id: state_id.to_string(),
                    }
                    .into());
                }
                graph.edges.push(Edge {
                    from: task.clone(),
                    to: Vertex::new(VertexKind::State, state_id),
                });
            }
        }

        debug!(
            vertices = graph.vertices.len(),
            edges = graph.edges.len(),
            "Built pipeline graph"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtoMlError;
    use crate::records::{InMemoryRecordStore, Record};
    use crate::types::{ColumnSpec, DataGroup, GroupSource, InducedTransform, State};

    fn group(store: &InMemoryRecordStore) -> String {
        store
            .add(Record::DataGroup(DataGroup {
                n_rows: 1,
                n_cols: 1,
                file_format: "csv".into(),
                source: GroupSource::Dataset {
                    path: "d.csv".into(),
                },
                columns: ColumnSpec::default(),
            }))
            .unwrap()
    }

    fn step(store: &InMemoryRecordStore, input: &str, output: &str) -> String {
        let mut it = InducedTransform {
            name: format!("{input}->{output}"),
            ..InducedTransform::default()
        };
        it.inputs.insert("in".into(), vec![input.into()]);
        it.outputs.insert("out".into(), vec![output.into()]);
        store.add(Record::InducedTransform(it)).unwrap()
    }

    #[test]
    fn test_vertex_and_edge_counts() {
        let store = InMemoryRecordStore::new();
        let groups: Vec<_> = (0..4).map(|_| group(&store)).collect();
        step(&store, &groups[0], &groups[1]);
        step(&store, &groups[1], &groups[2]);
        step(&store, &groups[2], &groups[3]);

        let graph = GraphBuilder::new(&store).build().unwrap();
        assert_eq!(graph.vertices.len(), 4 + 3);
        assert_eq!(graph.edges.len(), 2 * 3);
    }

    #[test]
    fn test_dangling_input_names_missing_id() {
        let store = InMemoryRecordStore::new();
        let out = group(&store);
        let id = step(&store, "ghost", &out);
        let err = GraphBuilder::new(&store).build().unwrap_err();
        match err {
            ProtoMlError::Integrity(err) => {
                assert_eq!(err.missing_id(), "ghost");
                assert!(err.to_string().contains(&id));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_dangling_output_state() {
        let store = InMemoryRecordStore::new();
        let mut it = InducedTransform::default();
        it.output_states.insert("model".into(), "st-missing".into());
        store.add(Record::InducedTransform(it)).unwrap();
        let err = GraphBuilder::new(&store).build().unwrap_err();
        assert!(matches!(
            err,
            ProtoMlError::Integrity(IntegrityError::MissingOutputState { .. })
        ));
    }

    #[test]
    fn test_state_edges() {
        let store = InMemoryRecordStore::new();
        let warm = store.add(Record::State(State::new("seed"))).unwrap();
        let model = store.add(Record::State(State::new("fit"))).unwrap();
        let mut it = InducedTransform::default();
        it.input_states.insert("warm".into(), warm.clone());
        it.output_states.insert("model".into(), model.clone());
        let id = store.add(Record::InducedTransform(it)).unwrap();

        let graph = GraphBuilder::new(&store).build().unwrap();
        let task = Vertex::new(VertexKind::InducedTransform, id);
        assert!(graph.edges.contains(&Edge {
            from: Vertex::new(VertexKind::State, warm),
            to: task.clone(),
        }));
        assert!(graph.edges.contains(&Edge {
            from: task,
            to: Vertex::new(VertexKind::State, model),
        }));
    }

    #[test]
    fn test_execution_order_and_producers() {
        let store = InMemoryRecordStore::new();
        let g: Vec<_> = (0..3).map(|_| group(&store)).collect();
        // Added in reverse so insertion order differs from data flow order.
        let second = step(&store, &g[1], &g[2]);
        let first = step(&store, &g[0], &g[1]);

        let graph = GraphBuilder::new(&store).build().unwrap();
        let order = graph.execution_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos(&first) < pos(&second));

        assert_eq!(graph.producers_of(&second), vec![first.clone()]);
        assert!(graph.producers_of(&first).is_empty());
    }

    #[test]
    fn test_execution_order_detects_cycle() {
        let store = InMemoryRecordStore::new();
        let a = group(&store);
        let b = group(&store);
        step(&store, &a, &b);
        step(&store, &b, &a);
        let graph = GraphBuilder::new(&store).build().unwrap();
        assert!(matches!(
            graph.execution_order(),
            Err(IntegrityError::Cycle { .. })
        ));
    }

    #[test]
    fn test_vertex_display() {
        let v = Vertex::new(VertexKind::InducedTransform, "42");
        assert_eq!(v.to_string(), "itransform:42");
    }
}
