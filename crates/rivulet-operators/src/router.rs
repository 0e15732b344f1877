//! Type-based fan-out: resolve a batch's type tag to the operator
//! configurations that must process it.
//!
//! One tag may feed several independent operators (e.g. two top-k
//! rankings over one group-by output); a join registers one operator
//! under two tags with a side marker. An unregistered tag is an error —
//! there is no default route to guess — and completion signals reach
//! every registered operator even when no row ever did, so zero-data
//! channels still propagate their terminal downstream.

use std::collections::HashMap;
use std::sync::Arc;

use rivulet_broker::Broker;
use rivulet_core::config::RuntimeConfig;
use rivulet_core::envelope::{ChannelId, ChannelOutcome};
use rivulet_core::row::Row;

use crate::error::{OpError, Result};
use crate::groupby::GroupByOp;
use crate::join::{JoinOp, Side};
use crate::select::SelectOp;
use crate::spec::{NodeSpec, OpSpec};
use crate::topk::TopKOp;

/// One stream operator as the worker drives it: rows in, completion in.
///
/// `side` is `Some` only for operators registered under two tags (joins).
pub trait StreamOperator {
    fn name(&self) -> &'static str;

    fn on_rows(&mut self, channel: &ChannelId, side: Option<Side>, rows: &[Row]) -> Result<()>;

    fn on_complete(
        &mut self,
        channel: &ChannelId,
        side: Option<Side>,
        outcome: &ChannelOutcome,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Route {
    op: usize,
    side: Option<Side>,
}

/// The fan-out table of one worker.
#[derive(Default)]
pub struct TypeRouter {
    ops: Vec<Box<dyn StreamOperator>>,
    routes: HashMap<String, Vec<Route>>,
    producers: HashMap<String, u32>,
}

impl TypeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator under one tag. The same tag may be registered
    /// repeatedly to fan one input out to several operators.
    pub fn register(&mut self, tag: &str, producers: u32, op: Box<dyn StreamOperator>) {
        let idx = self.ops.len();
        self.ops.push(op);
        self.routes
            .entry(tag.to_string())
            .or_default()
            .push(Route { op: idx, side: None });
        self.producers.insert(tag.to_string(), producers.max(1));
    }

    /// Register a join under its two tags with side markers.
    pub fn register_join(
        &mut self,
        left_tag: &str,
        left_producers: u32,
        right_tag: &str,
        right_producers: u32,
        op: Box<dyn StreamOperator>,
    ) {
        let idx = self.ops.len();
        self.ops.push(op);
        self.routes.entry(left_tag.to_string()).or_default().push(Route {
            op: idx,
            side: Some(Side::Left),
        });
        self.routes
            .entry(right_tag.to_string())
            .or_default()
            .push(Route {
                op: idx,
                side: Some(Side::Right),
            });
        self.producers
            .insert(left_tag.to_string(), left_producers.max(1));
        self.producers
            .insert(right_tag.to_string(), right_producers.max(1));
    }

    /// Upstream producer count for a tag (how many terminals to expect).
    pub fn producers_for(&self, tag: &str) -> u32 {
        self.producers.get(tag).copied().unwrap_or(1)
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.routes.contains_key(tag)
    }

    fn resolve(&self, tag: &str) -> Result<Vec<Route>> {
        self.routes
            .get(tag)
            .cloned()
            .ok_or_else(|| OpError::UnknownTag(tag.to_string()))
    }

    /// Feed one batch's rows to every operator registered under the
    /// channel's tag.
    pub fn dispatch_rows(&mut self, channel: &ChannelId, rows: &[Row]) -> Result<()> {
        for route in self.resolve(&channel.tag)? {
            self.ops[route.op].on_rows(channel, route.side, rows)?;
        }
        Ok(())
    }

    /// Deliver a channel's terminal outcome to every registered operator.
    pub fn dispatch_complete(&mut self, channel: &ChannelId, outcome: &ChannelOutcome) -> Result<()> {
        for route in self.resolve(&channel.tag)? {
            self.ops[route.op].on_complete(channel, route.side, outcome)?;
        }
        Ok(())
    }
}

impl NodeSpec {
    /// Compile this node's routes into a router. Configuration errors are
    /// fatal here, at startup — never at row time.
    pub fn compile(&self, broker: Arc<dyn Broker>, defaults: &RuntimeConfig) -> Result<TypeRouter> {
        let mut router = TypeRouter::new();
        for route in &self.routes {
            match &route.op {
                OpSpec::Join(spec) => {
                    if route.tag.is_some() {
                        return Err(OpError::Config(format!(
                            "node '{}': join routes carry their tags in left/right, not on the route",
                            self.name
                        )));
                    }
                    let op = JoinOp::from_spec(spec, Arc::clone(&broker), defaults.batch_rows)?;
                    router.register_join(
                        &spec.left.tag,
                        spec.left.producers,
                        &spec.right.tag,
                        spec.right.producers,
                        Box::new(op),
                    );
                }
                other => {
                    let tag = route.tag.as_deref().ok_or_else(|| {
                        OpError::Config(format!(
                            "node '{}': {} route needs a tag",
                            self.name,
                            other.kind()
                        ))
                    })?;
                    let op: Box<dyn StreamOperator> = match other {
                        OpSpec::Select(spec) => Box::new(SelectOp::from_spec(
                            spec,
                            Arc::clone(&broker),
                            defaults.batch_rows,
                        )?),
                        OpSpec::GroupBy(spec) => Box::new(GroupByOp::from_spec(
                            spec,
                            Arc::clone(&broker),
                            defaults.batch_rows,
                        )?),
                        OpSpec::TopK(spec) => Box::new(TopKOp::from_spec(
                            spec,
                            Arc::clone(&broker),
                            defaults.batch_rows,
                        )?),
                        OpSpec::Join(_) => unreachable!("handled above"),
                    };
                    router.register(tag, route.producers, op);
                }
            }
        }
        Ok(router)
    }
}
