//! Routing slips: an ordered itinerary of destinations attached to a
//! message, consumed one hop at a time.
//!
//! The slip is a forward-only-then-reverse state machine. The normal route
//! is consumed front-to-back by [`RoutingSlip::route_to_next_step`]; after a
//! failure, [`RoutingSlip::compensate`] redirects through the visited steps'
//! compensation paths in reverse (LIFO) order. Advancing is destructive and
//! only one consumer may advance the slip per message.

use crate::message::{properties, InboundBrokeredMessage, OutboundBrokeredMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

/// Errors from slip parsing and serialization.
#[derive(Debug, Error)]
pub enum RoutingSlipError {
    #[error("routing slip property is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One hop of a routing slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStep {
    /// Destination the message is forwarded to for this step.
    pub destination_path: String,
    /// Destination a compensating message is routed to if the slip fails
    /// after this step completed.
    pub compensation_path: Option<String>,
}

impl RoutingStep {
    /// A step routing to `destination`.
    pub fn to(destination: impl Into<String>) -> Self {
        Self {
            destination_path: destination.into(),
            compensation_path: None,
        }
    }

    pub fn with_compensating_step(mut self, path: impl Into<String>) -> Self {
        self.compensation_path = Some(path.into());
        self
    }
}

/// An ordered, mutable itinerary carried in a message's application
/// properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSlip {
    pub id: Uuid,
    /// Remaining steps, consumed front-to-back.
    pub route: VecDeque<RoutingStep>,
    /// Completed steps, oldest first.
    pub visited: Vec<RoutingStep>,
    /// Arbitrary data carried alongside the itinerary.
    pub attachments: HashMap<String, Value>,
    /// Whether the slip has been flipped into compensation mode.
    pub compensating: bool,
}

impl RoutingSlip {
    /// Start building a slip.
    pub fn builder(id: Uuid) -> RoutingSlipBuilder {
        RoutingSlipBuilder {
            id,
            route: VecDeque::new(),
            attachments: HashMap::new(),
        }
    }

    /// Pop the head of the route into `visited` and return its destination.
    ///
    /// Returns `None` when the route is exhausted.
    pub fn route_to_next_step(&mut self) -> Option<String> {
        let step = self.route.pop_front()?;
        let destination = step.destination_path.clone();
        self.visited.push(step);
        Some(destination)
    }

    /// Flip the slip into compensation mode.
    ///
    /// The remaining route is dropped and replaced by the visited steps'
    /// compensation paths in reverse completion order; steps without a
    /// compensation path are skipped. Visited is cleared so the compensating
    /// hops are themselves tracked as they run.
    pub fn compensate(&mut self) {
        self.compensating = true;
        let compensation: VecDeque<RoutingStep> = self
            .visited
            .drain(..)
            .rev()
            .filter_map(|step| step.compensation_path.map(RoutingStep::to))
            .collect();
        self.route = compensation;
    }

    /// Whether any hops remain.
    pub fn is_exhausted(&self) -> bool {
        self.route.is_empty()
    }

    /// Parse a slip from a message's application properties.
    ///
    /// Returns `Ok(None)` when the message does not carry a slip.
    pub fn from_properties(
        message: &InboundBrokeredMessage,
    ) -> Result<Option<RoutingSlip>, RoutingSlipError> {
        match message.property(properties::ROUTING_SLIP) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Serialize this slip onto an outbound message.
    pub fn apply_to(
        &self,
        message: &mut OutboundBrokeredMessage,
    ) -> Result<(), RoutingSlipError> {
        message.set_property(properties::ROUTING_SLIP, serde_json::to_value(self)?);
        Ok(())
    }

    /// Serialize this slip onto an inbound message, replacing any slip it
    /// already carries.
    pub fn apply_to_inbound(
        &self,
        message: &mut InboundBrokeredMessage,
    ) -> Result<(), RoutingSlipError> {
        message.set_property(properties::ROUTING_SLIP, serde_json::to_value(self)?);
        Ok(())
    }
}

/// Builder for the slip's route.
#[derive(Debug)]
pub struct RoutingSlipBuilder {
    id: Uuid,
    route: VecDeque<RoutingStep>,
    attachments: HashMap<String, Value>,
}

impl RoutingSlipBuilder {
    /// Append a step to the route.
    pub fn with_step(mut self, step: RoutingStep) -> Self {
        self.route.push_back(step);
        self
    }

    /// Attach arbitrary data to the slip.
    pub fn with_attachment(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attachments.insert(key.into(), value);
        self
    }

    pub fn build(self) -> RoutingSlip {
        RoutingSlip {
            id: self.id,
            route: self.route,
            visited: Vec::new(),
            attachments: self.attachments,
            compensating: false,
        }
    }
}
