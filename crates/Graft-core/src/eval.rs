//! # Evaluation
//!
//! Pull-based, memoized evaluation. Asking for an output walks the graph
//! backward through edges and aliases, recomputing only outputs that are not
//! `Fresh`, and stores each result in the producing node's output slot.
//!
//! The walk runs on an explicit work stack, so long chains cost heap, not
//! call stack. `max_eval_depth` still bounds how far upstream one request
//! may reach.
//!
//! ```ignore
//! let mut evaluator = Evaluator::new(&mut graph);
//! let value = evaluator.evaluate(node, 0)?;
//! println!("computed {} outputs", evaluator.stats().computed);
//! ```

use crate::error::EvalError;
use crate::graph::Graph;
use crate::model::{EvalInputs, EvalUnit, NodeId, PortId, SlotState};
use crate::ragged::RaggedValue;
use std::collections::HashSet;

/// Counters collected over the lifetime of one [`Evaluator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Outputs whose function ran successfully.
    pub computed: usize,
    /// Outputs served from cache.
    pub cached: usize,
    /// Outputs whose evaluation failed.
    pub failed: usize,
}

enum Frame {
    /// Schedule an output and everything it reads.
    Visit { port: PortId, depth: usize },
    /// Dependencies have settled; run the output's function.
    Compute { port: PortId },
}

pub struct Evaluator<'g> {
    graph: &'g mut Graph,
    stats: EvalStats,
}

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g mut Graph) -> Self {
        Self {
            graph,
            stats: EvalStats::default(),
        }
    }

    pub fn stats(&self) -> EvalStats {
        self.stats
    }

    /// Evaluates output `output` of `node`.
    pub fn evaluate(&mut self, node: NodeId, output: usize) -> Result<RaggedValue, EvalError> {
        let entry = self.graph.node(node).ok_or(EvalError::NodeNotFound(node))?;
        let port = *entry
            .outputs
            .get(output)
            .ok_or(EvalError::OutputOutOfRange { node, output })?;
        self.evaluate_port(port)
    }

    /// Evaluates the output port `port`.
    ///
    /// The flags of every output on the alias chain are applied on the way
    /// back out, innermost first.
    pub fn evaluate_port(&mut self, port: PortId) -> Result<RaggedValue, EvalError> {
        let chain = self.graph.alias_chain(port)?;
        let end = chain.last().copied().unwrap_or(port);
        self.settle(end)?;
        self.read_output(&chain)
    }

    /// Resolves the data read by input `port`: one value per producer.
    ///
    /// Edges win over aliases, aliases over the literal fallback. Upstream
    /// failures come back wrapped in [`EvalError::Upstream`].
    pub fn input_data(&mut self, port: PortId) -> Result<Vec<RaggedValue>, EvalError> {
        for producer in self.producers(port) {
            self.settle(producer)?;
        }
        self.read_input(port)
    }

    /// Brings `target` and everything it reads up to date.
    fn settle(&mut self, target: PortId) -> Result<(), EvalError> {
        let limit = self.graph.config().max_eval_depth;
        let mut visited = HashSet::new();
        let mut stack = vec![Frame::Visit {
            port: target,
            depth: 0,
        }];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit { port, depth } => {
                    let (node, output) = self.locate(port)?;
                    let entry = self.graph.node(node).ok_or(EvalError::NodeNotFound(node))?;
                    let slot = entry
                        .slots
                        .get(output)
                        .ok_or(EvalError::OutputOutOfRange { node, output })?;

                    if slot.state() == SlotState::Fresh {
                        tracing::debug!(node = %entry.uuid, output, "Cache hit");
                        self.stats.cached += 1;
                        continue;
                    }
                    if !visited.insert(port) {
                        continue;
                    }
                    if entry.eval_unit(output).is_none() {
                        self.finish(node, output, Err(EvalError::NoEvaluator { output }));
                        continue;
                    }
                    if depth >= limit {
                        self.finish(node, output, Err(EvalError::DepthExceeded { limit }));
                        continue;
                    }

                    stack.push(Frame::Compute { port });
                    let dependencies = self.dependencies(node, output);
                    stack.extend(dependencies.into_iter().rev().map(|dep| Frame::Visit {
                        port: dep,
                        depth: depth + 1,
                    }));
                }
                Frame::Compute { port } => {
                    let (node, output) = self.locate(port)?;
                    let unit = self
                        .graph
                        .node(node)
                        .and_then(|n| n.eval_unit(output))
                        .cloned();
                    let result = match unit {
                        Some(unit) => self.compute(node, &unit),
                        None => Err(EvalError::NoEvaluator { output }),
                    };
                    self.finish(node, output, result);
                }
            }
        }
        Ok(())
    }

    /// Passes `value` back along `ports`, last port first.
    fn apply_flags(&self, ports: &[PortId], mut value: RaggedValue) -> RaggedValue {
        for port in ports.iter().rev() {
            if let Some(port) = self.graph.port(*port) {
                value = port.flags.apply(value);
            }
        }
        value
    }

    fn locate(&self, port: PortId) -> Result<(NodeId, usize), EvalError> {
        self.graph
            .port(port)
            .map(|p| (p.node, p.index))
            .ok_or_else(|| EvalError::InvalidPortAlias {
                port,
                reason: "port no longer exists".to_string(),
            })
    }

    /// Computing outputs read by the eval unit of `node`'s output `output`.
    fn dependencies(&self, node: NodeId, output: usize) -> Vec<PortId> {
        let Some(entry) = self.graph.node(node) else {
            return Vec::new();
        };
        let Some(unit) = entry.eval_unit(output) else {
            return Vec::new();
        };
        unit.inputs
            .iter()
            .filter_map(|&i| entry.inputs.get(i).copied())
            .flat_map(|input| self.producers(input))
            .collect()
    }

    /// Computing outputs feeding input `port`, after alias resolution on both sides.
    fn producers(&self, port: PortId) -> Vec<PortId> {
        let Ok(chain) = self.input_chain(port) else {
            return Vec::new();
        };
        chain
            .last()
            .and_then(|p| self.graph.port(*p))
            .map(|p| p.edges.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|e| self.graph.edge(*e))
            .filter_map(|e| self.graph.follow_alias(e.source).ok())
            .collect()
    }

    /// `port` and the aliases it forwards through, stopping at the first port
    /// with edges.
    fn input_chain(&self, port: PortId) -> Result<Vec<PortId>, EvalError> {
        let mut chain = vec![port];
        let mut current = port;
        let mut visited = HashSet::new();
        loop {
            let entry = self
                .graph
                .port(current)
                .ok_or_else(|| EvalError::InvalidPortAlias {
                    port,
                    reason: "alias target no longer exists".to_string(),
                })?;
            if !entry.edges.is_empty() {
                return Ok(chain);
            }
            let Some(target) = entry.alias else {
                return Ok(chain);
            };
            if !visited.insert(current) || visited.len() > self.graph.config().max_alias_hops {
                return Err(EvalError::InvalidPortAlias {
                    port,
                    reason: "alias chain does not terminate".to_string(),
                });
            }
            chain.push(target);
            current = target;
        }
    }

    /// Reads an input whose producers have settled.
    fn read_input(&self, port: PortId) -> Result<Vec<RaggedValue>, EvalError> {
        let chain = self.input_chain(port)?;
        let last = chain.last().copied().unwrap_or(port);
        let entry = self
            .graph
            .port(last)
            .ok_or_else(|| EvalError::InvalidPortAlias {
                port,
                reason: "alias target no longer exists".to_string(),
            })?;

        let values = if entry.edges.is_empty() {
            let literal = self
                .graph
                .node(entry.node)
                .and_then(|node| node.properties.get(&entry.name))
                .or(entry.default.as_ref())
                .map(RaggedValue::from_jagged)
                .unwrap_or_else(RaggedValue::empty);
            vec![literal]
        } else {
            entry
                .edges
                .iter()
                .filter_map(|e| self.graph.edge(*e))
                .map(|e| self.read_upstream(e.source))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(values
            .into_iter()
            .map(|value| self.apply_flags(&chain, value))
            .collect())
    }

    fn read_upstream(&self, source: PortId) -> Result<RaggedValue, EvalError> {
        let chain = self.graph.alias_chain(source)?;
        self.read_output(&chain).map_err(|err| {
            let node = chain
                .last()
                .and_then(|p| self.graph.port(*p))
                .and_then(|p| self.graph.node(p.node))
                .map(|n| n.uuid)
                .unwrap_or_default();
            EvalError::Upstream {
                node,
                source: Box::new(err),
            }
        })
    }

    /// The settled value at the end of `chain`, or the error it failed with.
    fn read_output(&self, chain: &[PortId]) -> Result<RaggedValue, EvalError> {
        let Some((&end, outer)) = chain.split_last() else {
            return Err(EvalError::Compute("empty alias chain".to_string()));
        };
        let (node, output) = self.locate(end)?;
        let slot = self
            .graph
            .node(node)
            .and_then(|n| n.slots.get(output))
            .ok_or(EvalError::OutputOutOfRange { node, output })?;
        match (slot.state(), &slot.cache) {
            (SlotState::Fresh, Some(value)) => Ok(self.apply_flags(outer, value.clone())),
            _ => Err(slot.error.clone().unwrap_or_else(|| {
                EvalError::Compute(format!("output {} was not evaluated", output))
            })),
        }
    }

    fn compute(&self, node: NodeId, unit: &EvalUnit) -> Result<RaggedValue, EvalError> {
        let mut values = Vec::with_capacity(unit.inputs.len());
        for &index in &unit.inputs {
            let port = self
                .graph
                .input_port(node, index)
                .ok_or(EvalError::NodeNotFound(node))?;
            values.push(self.read_input(port)?);
        }

        let entry = self.graph.node(node).ok_or(EvalError::NodeNotFound(node))?;
        let inputs = EvalInputs::new(values, &entry.properties);
        let value = (unit.func)(&inputs)?;

        let flags = entry
            .outputs
            .get(unit.output)
            .and_then(|p| self.graph.port(*p))
            .map(|p| p.flags)
            .unwrap_or_default();
        Ok(flags.apply(value))
    }

    fn finish(&mut self, node: NodeId, output: usize, result: Result<RaggedValue, EvalError>) {
        let Some(entry) = self.graph.nodes.get_mut(node) else {
            return;
        };
        let uuid = entry.uuid;
        let Some(slot) = entry.slots.get_mut(output) else {
            return;
        };
        match result {
            Ok(value) => {
                tracing::debug!(node = %uuid, output, len = value.len(), "Recomputed output");
                slot.cache = Some(value);
                slot.dirty = false;
                slot.invalid = false;
                slot.error = None;
                self.stats.computed += 1;
            }
            Err(err) => {
                tracing::warn!(node = %uuid, output, error = %err, "Node evaluation failed");
                slot.dirty = true;
                slot.invalid = false;
                slot.error = Some(err);
                self.stats.failed += 1;
            }
        }
    }
}
