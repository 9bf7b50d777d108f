//! Model candidate selection

use tracing::{info, warn};

use crate::llm::ChatBackend;

/// Ordered model candidates with a cursor on the one in use
#[derive(Debug, Clone)]
pub struct ModelSelector {
    candidates: Vec<String>,
    current: usize,
}

impl ModelSelector {
    /// Candidates in preference order, already de-duplicated
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            candidates,
            current: 0,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.candidates.get(self.current).map(String::as_str)
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Move to the next untried candidate
    pub fn advance(&mut self) -> Option<&str> {
        if self.current + 1 >= self.candidates.len() {
            return None;
        }
        self.current += 1;
        self.current()
    }

    /// Select the first installed candidate. A failed probe keeps the
    /// current choice.
    pub async fn probe(&mut self, backend: &dyn ChatBackend) -> Option<&str> {
        let installed = match backend.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "Model probe skipped");
                return self.current();
            }
        };

        match self
            .candidates
            .iter()
            .position(|candidate| installed.iter().any(|m| m == candidate))
        {
            Some(index) => {
                if index != self.current {
                    info!(model = %self.candidates[index], "Auto-selected installed model");
                }
                self.current = index;
            }
            None => {
                warn!(
                    candidates = %self.candidates.join(", "),
                    "None of the configured models are installed"
                );
            }
        }
        self.current()
    }
}
