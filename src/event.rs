use std::time::Duration;

/// Published whenever an activity invocation completes, successfully or
/// not. A `workflow` value prefixed with `*` marks a setup-phase event,
/// consumed by both the metrics sink and the printer.
#[derive(Clone, Debug)]
pub struct Event {
    pub workflow: String,
    pub name: String,
    pub duration: Duration,
    pub err: Option<String>,
}

impl Event {
    pub fn ok(workflow: impl Into<String>, name: impl Into<String>, duration: Duration) -> Self {
        Event {
            workflow: workflow.into(),
            name: name.into(),
            duration,
            err: None,
        }
    }

    pub fn err(
        workflow: impl Into<String>,
        name: impl Into<String>,
        duration: Duration,
        err: impl ToString,
    ) -> Self {
        Event {
            workflow: workflow.into(),
            name: name.into(),
            duration,
            err: Some(err.to_string()),
        }
    }

    pub fn is_setup(&self) -> bool {
        self.workflow.starts_with('*')
    }

    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }
}
