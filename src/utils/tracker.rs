#![allow(unused)]

use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Post,
    Defer,
    Dispatch,
    Stop,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Post {
        is_continuation: bool,
        /// Whether the fast path onto the worker's private queue was taken.
        private: bool,
    },
    Defer {
        private: bool,
    },
    Dispatch,
    Stop,
    Shutdown,
}

/// Test-only introspection on which enqueue path each scheduler call took.
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Arc<DashMap<Method, Vec<Call>>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        let map = DashMap::new();
        map.insert(Method::Post, Vec::new());
        map.insert(Method::Defer, Vec::new());
        map.insert(Method::Dispatch, Vec::new());
        map.insert(Method::Stop, Vec::new());
        map.insert(Method::Shutdown, Vec::new());

        Self {
            calls: Arc::new(map),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.calls
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .get(method)
            .expect("method not found")
            .value()
            .clone()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.get(method).map_or(0, |calls| calls.len())
    }
}
