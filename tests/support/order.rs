//! A small order domain used across the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sourced_dispatch::deadline::{DEADLINE_NAME, SCOPE_ID};
use sourced_dispatch::{Command, HandlerError, ScopeAware, UnitOfWork};

use super::recording::EventLog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Command)]
#[command(name = "order.create")]
pub struct CreateOrder {
    pub order_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Command)]
pub struct CancelOrder {
    pub order_id: String,
}

/// Handler for `CreateOrder`: rejects empty orders, echoes the rest.
pub fn create_order(command: CreateOrder, _uow: &mut UnitOfWork) -> Result<Value, HandlerError> {
    if command.quantity == 0 {
        return Err(HandlerError::Rejected("quantity must be positive".into()));
    }
    Ok(json!({ "order_id": command.order_id, "quantity": command.quantity }))
}

/// A loaded order aggregate that records the deadlines it receives.
pub struct OrderAggregate {
    pub label: String,
    pub log: EventLog,
    pub fail: bool,
}

impl OrderAggregate {
    pub fn new(label: &str, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log: log.clone(),
            fail: false,
        })
    }

    pub fn failing(label: &str, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log: log.clone(),
            fail: true,
        })
    }
}

impl ScopeAware for OrderAggregate {
    fn handle_deadline(&self, uow: &mut UnitOfWork) -> Result<(), HandlerError> {
        let message = uow.message();
        let deadline = message.metadata().get(DEADLINE_NAME).unwrap_or_default().to_string();
        let scope_id = message.metadata().get(SCOPE_ID).unwrap_or_default().to_string();

        // Each delivery must start with an empty unit of work.
        if uow.resources().contains("delivered-to") {
            return Err(HandlerError::Rejected("unit of work shared between targets".into()));
        }
        uow.resources_mut().insert("delivered-to", self.label.clone());

        if self.fail {
            self.log.push(format!("{} failed {} for {}", self.label, deadline, scope_id));
            return Err(HandlerError::Rejected(format!("{} refuses {}", self.label, deadline)));
        }
        self.log.push(format!("{} handled {} for {}", self.label, deadline, scope_id));
        Ok(())
    }
}
