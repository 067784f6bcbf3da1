//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use trellis::{Container, Context, HttpError, Middleware, Terminator};

/// Ordered record of which handlers ran.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn step(&self, label: &'static str) -> Step {
        Step { log: self.clone(), label }
    }
}

/// A middleware / terminator that only records its label.
pub struct Step {
    log: Log,
    label: &'static str,
}

#[async_trait]
impl Middleware for Step {
    async fn handle(&self, _ctx: &Context) -> Result<(), HttpError> {
        self.log.push(self.label);
        Ok(())
    }
}

#[async_trait]
impl Terminator for Step {
    async fn terminate(&self, _ctx: &Context) -> Result<(), HttpError> {
        self.log.push(self.label);
        Ok(())
    }
}

pub fn container() -> Arc<Container> {
    Arc::new(Container::new())
}

pub async fn ok(_ctx: Context) -> &'static str {
    "ok"
}
