//! Property values that may be resolved later by the provisioning engine.
//!
//! Most resource properties are plain literals, but many hold identifiers that
//! only exist once an upstream resource has been created (a subnet's VPC id, a
//! service's target group ARN). Those are modelled as [`Reference`]s and
//! rendered as `${resource.attribute}` placeholders in the manifest.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::tags::Tags;

/// A deferred reference to an attribute of another declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    /// Logical name of the referenced resource
    pub resource: String,
    /// Output attribute of the referenced resource
    pub attribute: String,
}

impl Reference {
    /// Create a new reference
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.resource, self.attribute)
    }
}

/// A resource property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A fully known JSON value
    Literal(Value),
    /// An attribute of another resource, known after creation
    Ref(Reference),
    /// A provider data-source lookup resolved by the engine
    Invoke {
        /// Provider function token
        function: String,
        /// Field of the function result
        field: String,
    },
    /// String interpolation of several parts
    Concat(Vec<Input>),
    /// A list of inputs
    List(Vec<Input>),
    /// A map of inputs, in declaration order
    Map(IndexMap<String, Input>),
    /// The JSON encoding of the inner value, as a string
    ToJson(Box<Input>),
    /// A value the engine must store encrypted
    Secret(Box<Input>),
}

impl Input {
    /// A literal JSON value
    pub fn literal(value: impl Into<Value>) -> Self {
        Input::Literal(value.into())
    }

    /// A string interpolation
    pub fn concat(parts: impl IntoIterator<Item = Input>) -> Self {
        Input::Concat(parts.into_iter().collect())
    }

    /// A map built from key/value pairs
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Input)>,
    {
        Input::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A list of inputs
    pub fn list(items: impl IntoIterator<Item = Input>) -> Self {
        Input::List(items.into_iter().collect())
    }

    /// JSON-encode the inner value
    pub fn to_json(inner: Input) -> Self {
        Input::ToJson(Box::new(inner))
    }

    /// Mark the inner value as secret
    pub fn secret(inner: Input) -> Self {
        Input::Secret(Box::new(inner))
    }

    /// Whether the value is fully known without the engine
    pub fn is_known(&self) -> bool {
        match self {
            Input::Literal(_) => true,
            Input::Ref(_) | Input::Invoke { .. } | Input::Secret(_) => false,
            Input::Concat(parts) | Input::List(parts) => parts.iter().all(Input::is_known),
            Input::Map(entries) => entries.values().all(Input::is_known),
            Input::ToJson(inner) => inner.is_known(),
        }
    }

    /// Collect every resource reference embedded in this value
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Input::Literal(_) | Input::Invoke { .. } => {}
            Input::Ref(reference) => out.push(reference),
            Input::Concat(parts) | Input::List(parts) => {
                for part in parts {
                    part.collect_references(out);
                }
            }
            Input::Map(entries) => {
                for value in entries.values() {
                    value.collect_references(out);
                }
            }
            Input::ToJson(inner) | Input::Secret(inner) => inner.collect_references(out),
        }
    }

    /// Render into the manifest representation.
    ///
    /// References become `${name.attr}` strings, interpolations become a
    /// single string when every part can be interpolated, and JSON-encoded
    /// values collapse to a literal string when fully known.
    pub fn render(&self) -> Value {
        match self {
            Input::Literal(value) => value.clone(),
            Input::Ref(reference) => Value::String(reference.to_string()),
            Input::Invoke { function, field } => json!({
                "fn::invoke": { "function": function, "return": field }
            }),
            Input::Concat(parts) => render_concat(parts),
            Input::List(items) => Value::Array(items.iter().map(Input::render).collect()),
            Input::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render()))
                    .collect(),
            ),
            Input::ToJson(inner) => {
                let rendered = inner.render();
                if inner.is_known() {
                    Value::String(rendered.to_string())
                } else {
                    json!({ "fn::toJSON": rendered })
                }
            }
            Input::Secret(inner) => json!({ "fn::secret": inner.render() }),
        }
    }
}

fn render_concat(parts: &[Input]) -> Value {
    let interpolable = parts
        .iter()
        .all(|p| matches!(p, Input::Ref(_) | Input::Literal(_)));

    if !interpolable {
        return json!({
            "fn::join": ["", parts.iter().map(Input::render).collect::<Vec<_>>()]
        });
    }

    let mut out = String::new();
    for part in parts {
        match part {
            Input::Ref(reference) => out.push_str(&reference.to_string()),
            // `$` is the interpolation marker; literal dollars are doubled
            Input::Literal(Value::String(s)) => out.push_str(&s.replace('$', "$$")),
            Input::Literal(other) => out.push_str(&other.to_string()),
            other => out.push_str(&other.render().to_string()),
        }
    }
    Value::String(out)
}

impl From<Reference> for Input {
    fn from(reference: Reference) -> Self {
        Input::Ref(reference)
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Literal(Value::String(s.to_string()))
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Literal(Value::String(s))
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Input::Literal(Value::Bool(b))
    }
}

impl From<i64> for Input {
    fn from(n: i64) -> Self {
        Input::Literal(n.into())
    }
}

impl From<u32> for Input {
    fn from(n: u32) -> Self {
        Input::Literal(n.into())
    }
}

impl From<u16> for Input {
    fn from(n: u16) -> Self {
        Input::Literal(n.into())
    }
}

impl From<f64> for Input {
    fn from(n: f64) -> Self {
        Input::Literal(n.into())
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<Vec<Input>> for Input {
    fn from(items: Vec<Input>) -> Self {
        Input::List(items)
    }
}

impl From<Vec<Reference>> for Input {
    fn from(items: Vec<Reference>) -> Self {
        Input::List(items.into_iter().map(Input::Ref).collect())
    }
}

impl From<&Tags> for Input {
    fn from(tags: &Tags) -> Self {
        Input::map(tags.iter().map(|(k, v)| (k, Input::from(v))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reference_display() {
        let r = Reference::new("elk-vpc", "id");
        assert_eq!(r.to_string(), "${elk-vpc.id}");
    }

    #[test]
    fn test_render_concat_interpolates() {
        let input = Input::concat([
            Input::from("service/"),
            Reference::new("elk-ecs-cluster", "name").into(),
            Input::from("/"),
            Reference::new("elk-kibana-service", "name").into(),
        ]);
        assert_eq!(
            input.render(),
            json!("service/${elk-ecs-cluster.name}/${elk-kibana-service.name}")
        );
    }

    #[test]
    fn test_render_concat_escapes_dollars() {
        let input = Input::concat([Input::from("cost: $5")]);
        assert_eq!(input.render(), json!("cost: $$5"));
    }

    #[test]
    fn test_render_concat_with_invoke_uses_join() {
        let input = Input::concat([
            Input::from("arn:aws:iam::"),
            Input::Invoke {
                function: "aws:index/getCallerIdentity:getCallerIdentity".into(),
                field: "accountId".into(),
            },
            Input::from(":root"),
        ]);
        let rendered = input.render();
        assert!(rendered.get("fn::join").is_some());
    }

    #[test]
    fn test_known_to_json_becomes_string() {
        let input = Input::to_json(Input::map([("a", Input::from(1_i64))]));
        assert_eq!(input.render(), json!("{\"a\":1}"));
    }

    #[test]
    fn test_unknown_to_json_is_deferred() {
        let input = Input::to_json(Input::map([(
            "password",
            Input::from(Reference::new("elk-db-password", "result")),
        )]));
        assert_eq!(
            input.render(),
            json!({ "fn::toJSON": { "password": "${elk-db-password.result}" } })
        );
    }

    #[test]
    fn test_references_are_collected_recursively() {
        let input = Input::map([
            ("vpcId", Input::from(Reference::new("elk-vpc", "id"))),
            (
                "subnets",
                Input::list([
                    Reference::new("elk-private-a", "id").into(),
                    Reference::new("elk-private-b", "id").into(),
                ]),
            ),
            (
                "secret",
                Input::secret(Reference::new("elk-db-password", "result").into()),
            ),
        ]);
        let refs: Vec<_> = input.references().iter().map(|r| r.resource.clone()).collect();
        assert_eq!(
            refs,
            vec!["elk-vpc", "elk-private-a", "elk-private-b", "elk-db-password"]
        );
        assert!(!input.is_known());
    }
}
