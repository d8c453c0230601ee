//! Counterexample representation and rendering.
//!
//! When a property fails, the checker attaches what it knows about the
//! failure: the DST seed that reproduces it, snapshots of the observable
//! state and, when a harness recorded one, the per-thread interleaving.

use std::fmt::Write as _;

/// Failure path for a violated property.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Snapshots in step order
    pub states: Vec<StateSnapshot>,
    /// Thread actions in step order
    pub interleaving: Vec<ThreadAction>,
    /// DST seed for reproduction
    pub dst_seed: Option<u64>,
    /// One-line summary of the failure
    pub description: Option<String>,
}

/// Observable state at one step.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub step: u64,
    pub description: String,
    pub variables: Vec<(String, String)>,
}

/// One operation performed by a (logical) thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    pub thread_id: u64,
    pub step: u64,
    pub action: String,
    pub success: bool,
}

impl Counterexample {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Build from an optional seed, the common case for checkers.
    #[must_use]
    pub fn for_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a snapshot. Steps must be strictly increasing.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in step order"
        );
        self.states.push(state);
    }

    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    /// Render as a step-by-thread table.
    ///
    /// ```text
    /// DST_SEED=42
    ///
    /// Step | Thread 0 | Thread 1 | State
    /// -----|----------|----------|------
    ///    1 | push(1)  |          | top=1
    ///    2 |          | pop()    | top=-
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut out = String::new();

        if let Some(seed) = self.dst_seed {
            let _ = writeln!(out, "DST_SEED={}\n", seed);
        }
        if let Some(desc) = &self.description {
            let _ = writeln!(out, "Failure: {}\n", desc);
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            out.push_str("(no thread actions recorded)\n");
            for state in &self.states {
                let _ = writeln!(out, "{:4} | {}", state.step, state.description);
                for (name, value) in &state.variables {
                    let _ = writeln!(out, "     |   {} = {}", name, value);
                }
            }
            return out;
        }

        out.push_str("Step |");
        for tid in &threads {
            let _ = write!(out, " Thread {} |", tid);
        }
        out.push_str(" State\n-----|");
        for _ in &threads {
            out.push_str("----------|");
        }
        out.push_str("------\n");

        let mut steps: Vec<u64> = self
            .interleaving
            .iter()
            .map(|a| a.step)
            .chain(self.states.iter().map(|s| s.step))
            .collect();
        steps.sort_unstable();
        steps.dedup();

        for step in steps {
            let _ = write!(out, "{:4} |", step);
            for tid in &threads {
                match self
                    .interleaving
                    .iter()
                    .find(|a| a.step == step && a.thread_id == *tid)
                {
                    Some(a) if a.success => {
                        let _ = write!(out, " {} |", a.action);
                    }
                    Some(a) => {
                        let _ = write!(out, " {} [FAIL] |", a.action);
                    }
                    None => out.push_str("          |"),
                }
            }
            if let Some(state) = self.states.iter().find(|s| s.step == step) {
                let _ = write!(out, " {}", state.description);
            }
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_constructors() {
        assert_eq!(Counterexample::for_seed(Some(7)).dst_seed, Some(7));
        assert!(Counterexample::for_seed(None).dst_seed.is_none());
    }

    #[test]
    fn test_render_diagram() {
        let mut ce = Counterexample::with_seed(42).with_description("lost 3");
        ce.add_action(ThreadAction {
            thread_id: 0,
            step: 1,
            action: "push(3)".to_string(),
            success: true,
        });
        ce.add_action(ThreadAction {
            thread_id: 1,
            step: 2,
            action: "pop()".to_string(),
            success: false,
        });
        ce.add_state(StateSnapshot {
            step: 1,
            description: "top=3".to_string(),
            variables: vec![],
        });

        let diagram = ce.render_diagram();
        assert!(diagram.contains("DST_SEED=42"));
        assert!(diagram.contains("Failure: lost 3"));
        assert!(diagram.contains("Thread 1"));
        assert!(diagram.contains("pop() [FAIL]"));
        assert!(diagram.contains("top=3"));
    }

    #[test]
    fn test_render_without_actions_lists_states() {
        let mut ce = Counterexample::new();
        ce.add_state(StateSnapshot {
            step: 1,
            description: "Element 9 lost".to_string(),
            variables: vec![("contents".to_string(), "[1, 2]".to_string())],
        });

        let diagram = ce.render_diagram();
        assert!(diagram.contains("no thread actions"));
        assert!(diagram.contains("contents = [1, 2]"));
    }
}
