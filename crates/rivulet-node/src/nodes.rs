//! Worker roles. Each stage binary hosts one kind of work: select nodes
//! filter and project, group-by nodes aggregate and rank, join nodes
//! join. The wrappers only validate the route table — the loop itself is
//! [`Worker`] for every role.

use std::sync::Arc;

use rivulet_broker::Broker;
use rivulet_core::config::RuntimeConfig;
use rivulet_operators::spec::NodeSpec;

use crate::error::{NodeError, Result};
use crate::worker::{Worker, WorkerStats};

fn validate_kinds(spec: &NodeSpec, role: &str, allowed: &[&str]) -> Result<()> {
    for route in &spec.routes {
        let kind = route.op.kind();
        if !allowed.contains(&kind) {
            return Err(NodeError::Role(format!(
                "node '{}': a {role} node cannot host a {kind} operator",
                spec.name
            )));
        }
    }
    Ok(())
}

pub struct SelectNode {
    worker: Worker,
}

impl SelectNode {
    pub fn from_spec(broker: Arc<dyn Broker>, spec: &NodeSpec, config: &RuntimeConfig) -> Result<Self> {
        validate_kinds(spec, "select", &["select"])?;
        Ok(Self {
            worker: Worker::new(broker, spec, config)?,
        })
    }

    pub fn run(&mut self) -> Result<WorkerStats> {
        self.worker.run()
    }
}

/// Hosts the keyed aggregators: group-by and top-k.
pub struct GroupByNode {
    worker: Worker,
}

impl GroupByNode {
    pub fn from_spec(broker: Arc<dyn Broker>, spec: &NodeSpec, config: &RuntimeConfig) -> Result<Self> {
        validate_kinds(spec, "group-by", &["group_by", "top_k"])?;
        Ok(Self {
            worker: Worker::new(broker, spec, config)?,
        })
    }

    pub fn run(&mut self) -> Result<WorkerStats> {
        self.worker.run()
    }
}

pub struct JoinNode {
    worker: Worker,
}

impl JoinNode {
    pub fn from_spec(broker: Arc<dyn Broker>, spec: &NodeSpec, config: &RuntimeConfig) -> Result<Self> {
        validate_kinds(spec, "join", &["join"])?;
        Ok(Self {
            worker: Worker::new(broker, spec, config)?,
        })
    }

    pub fn run(&mut self) -> Result<WorkerStats> {
        self.worker.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_broker::InMemoryBroker;
    use rivulet_operators::spec::{OpSpec, RouteSpec, SelectSpec, SinkSpec};

    fn select_node_spec() -> NodeSpec {
        NodeSpec {
            name: "select-0".into(),
            queue: "select.0".into(),
            default_tag: None,
            routes: vec![RouteSpec {
                tag: Some("t".into()),
                producers: 1,
                op: OpSpec::Select(SelectSpec {
                    input: vec!["a".into()],
                    filters: vec![],
                    derive: vec![],
                    output: vec!["a".into()],
                    sink: SinkSpec {
                        queue: "out".into(),
                        shards: 1,
                        key: vec![],
                        batch_rows: None,
                        tag: None,
                    },
                }),
            }],
        }
    }

    #[test]
    fn role_validation_rejects_wrong_kind() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let spec = select_node_spec();
        assert!(SelectNode::from_spec(Arc::clone(&broker), &spec, &RuntimeConfig::default()).is_ok());
        assert!(matches!(
            GroupByNode::from_spec(broker, &spec, &RuntimeConfig::default()),
            Err(NodeError::Role(_))
        ));
    }
}
