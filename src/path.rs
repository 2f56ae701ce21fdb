use crate::plan::{FieldSet, ProjectionPlan};

/// Dotted-path cursor for one decode session, parallel to the token
/// stream's nesting. Field names and map keys are pushed as-is; array
/// elements and other dynamic levels push an empty segment, which never
/// extends the dotted path.
#[derive(Debug, Default)]
pub struct PathStack {
    segments: Vec<String>,
}

impl PathStack {
    pub fn new() -> Self {
        PathStack::default()
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    /// Must be called exactly once per push, including on error paths.
    pub fn pop(&mut self) {
        self.segments.pop();
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Current dotted path, and the parent path (the same minus the last
    /// non-empty segment). The first pushed segment is never dot-prefixed;
    /// empty segments are skipped past the first.
    pub fn current_and_parent(&self) -> (String, String) {
        let mut path: Option<String> = None;
        let mut parent = String::new();
        for segment in &self.segments {
            match path {
                None => path = Some(segment.clone()),
                Some(ref mut p) if !segment.is_empty() => {
                    parent = p.clone();
                    if p.is_empty() {
                        *p = segment.clone();
                    } else {
                        p.push('.');
                        p.push_str(segment);
                    }
                }
                Some(_) => (),
            }
        }
        (path.unwrap_or_default(), parent)
    }

    pub fn current_path(&self) -> String {
        self.current_and_parent().0
    }

    /// The field subset applicable at the current level: the union of the
    /// plan's exact entry for the current path and its wildcard entry for
    /// the parent path. `None` means no explicit projection here, so
    /// everything present is materialized.
    pub fn effective_fields(&self, plan: &ProjectionPlan) -> Option<FieldSet> {
        let (path, parent) = self.current_and_parent();
        let exact = plan.entry(&path);
        let wildcard = plan.entry(&format!("{}.*", parent));
        match (exact, wildcard) {
            (None, None) => None,
            (one, other) => {
                let mut union = FieldSet::new();
                if let Some(set) = one {
                    union.union(set);
                }
                if let Some(set) = other {
                    union.union(set);
                }
                Some(union)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::plan::{resolve_projection_plan, InclusionSpec};
    use crate::schema::{ModelRegistry, Property};

    #[test]
    fn join_convention() {
        let mut stack = PathStack::new();
        assert_eq!(stack.current_and_parent(), ("".into(), "".into()));
        stack.push("stocks");
        assert_eq!(stack.current_and_parent(), ("stocks".into(), "".into()));
        stack.push("1");
        assert_eq!(
            stack.current_and_parent(),
            ("stocks.1".into(), "stocks".into())
        );
        stack.push("");
        assert_eq!(
            stack.current_and_parent(),
            ("stocks.1".into(), "stocks".into())
        );
        stack.push("price");
        assert_eq!(
            stack.current_and_parent(),
            ("stocks.1.price".into(), "stocks.1".into())
        );
        stack.pop();
        stack.pop();
        stack.pop();
        stack.pop();
        assert_eq!(stack.depth(), 0);
    }

    fn plan_for(paths: &[&str]) -> ProjectionPlan {
        let mut model = ModelRegistry::new();
        model
            .define(
                "Product",
                vec![
                    Property::simple("name"),
                    Property::reference("stocks", "Stock").map(),
                ],
            )
            .define(
                "Stock",
                vec![Property::simple("price"), Property::simple("qty")],
            );
        let spec: InclusionSpec = paths.iter().copied().collect();
        resolve_projection_plan(&model, "Product", &spec)
    }

    #[test]
    fn effective_fields_unions_exact_and_parent_wildcard() {
        let plan = plan_for(&["stocks.*.price", "stocks.7.qty"]);
        let mut stack = PathStack::new();
        stack.push("stocks");
        stack.push("7");
        let fields = stack.effective_fields(&plan).unwrap();
        assert!(fields.includes("price"));
        assert!(fields.includes("qty"));
        stack.pop();
        stack.push("3");
        let fields = stack.effective_fields(&plan).unwrap();
        assert!(fields.includes("price"));
        assert!(!fields.includes("qty"));
    }

    #[test]
    fn unrestricted_plan_has_no_fields_anywhere() {
        let plan = ProjectionPlan::unrestricted();
        let mut stack = PathStack::new();
        assert_eq!(stack.effective_fields(&plan), None);
        stack.push("anything");
        assert_eq!(stack.effective_fields(&plan), None);
    }
}
