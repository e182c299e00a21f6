//! Invocation context threaded through dispatch, tools, and delegation.

use uuid::Uuid;

/// Who is running and on whose behalf.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Unique id for this invocation.
    pub invocation_id: Uuid,
    /// Scheduler job that started the chain, if any.
    pub job_id: Option<Uuid>,
    /// Qualified name of the agent currently executing, if any.
    pub agent: Option<String>,
    /// Delegation depth below the top-level request (0 = top level).
    pub depth: usize,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            job_id: None,
            agent: None,
            depth: 0,
        }
    }
}

impl InvocationContext {
    /// Context for a scheduled job.
    pub fn for_job(job_id: Uuid) -> Self {
        Self {
            job_id: Some(job_id),
            ..Default::default()
        }
    }

    /// Context for running as `agent`, keeping the same chain.
    pub fn as_agent(&self, agent: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            ..self.clone()
        }
    }

    /// Context for a delegated call one level deeper.
    pub fn delegated(&self) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            job_id: self.job_id,
            agent: self.agent.clone(),
            depth: self.depth + 1,
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        match (self.job_id, &self.agent) {
            (Some(job), Some(agent)) => format!("[{agent} job:{job}]"),
            (Some(job), None) => format!("[job:{job}]"),
            (None, Some(agent)) => format!("[{agent}]"),
            (None, None) => "[task]".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegation_increments_depth_and_keeps_job() {
        let job = Uuid::new_v4();
        let ctx = InvocationContext::for_job(job).as_agent("Root");
        let child = ctx.delegated();
        assert_eq!(child.depth, 1);
        assert_eq!(child.job_id, Some(job));
        assert_ne!(child.invocation_id, ctx.invocation_id);
        assert_eq!(child.delegated().depth, 2);
    }

    #[test]
    fn labels() {
        assert_eq!(InvocationContext::default().label(), "[task]");
        let ctx = InvocationContext::default().as_agent("Root/Billing");
        assert_eq!(ctx.label(), "[Root/Billing]");
    }
}
