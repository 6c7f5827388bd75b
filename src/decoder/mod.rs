//! Decoder registry and the decode recursion.
//!
//! A [`Decoder`] turns a [`Node`] into the canonical `serde_json::Value` for a
//! [`TypeDesc`]. The registry picks one decoder per descriptor; the
//! [`DecoderContext`] wraps every call with resolver application, usage
//! tracking and the shared null/undefined handling, so concrete decoders only
//! ever see defined, non-null nodes (records aside, which may be built from
//! nothing when every field has a default).

mod collections;
mod primitives;
mod record;
mod sum;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use stillwater::Validation;

use crate::describe::TypeDesc;
use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt};
use crate::mapper::ParameterMapper;
use crate::node::{DotPath, Node};
use crate::report::Reporter;
use crate::resolver::Resolver;
use crate::secret::SecretPolicy;

pub use collections::{ListDecoder, MapDecoder};
pub use primitives::{
    parse_duration, AnyDecoder, BoolDecoder, CharDecoder, DurationDecoder, EnumDecoder,
    FloatDecoder, IntegerDecoder, ParsedDecoder, StringDecoder,
};
pub use record::RecordDecoder;
pub use sum::SumDecoder;

/// Converts nodes of one type shape into values.
pub trait Decoder: Send + Sync {
    /// Name used in trace output.
    fn name(&self) -> &str;

    fn supports(&self, desc: &TypeDesc) -> bool;

    /// Higher wins when several decoders support a descriptor.
    fn priority(&self) -> i32 {
        0
    }

    /// Decode a defined, non-null node. `path` is where the node sits in the
    /// tree and is used for every error and nested decode.
    fn decode(
        &self,
        node: &Node,
        desc: &TypeDesc,
        path: &DotPath,
        ctx: &DecoderContext<'_>,
    ) -> ConfigValidation<Value>;
}

/// Ordered set of decoders.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn Decoder>>,
}

impl DecoderRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Registry with every built-in decoder at priority 0.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register(BoolDecoder)
            .register(IntegerDecoder)
            .register(FloatDecoder)
            .register(CharDecoder)
            .register(StringDecoder)
            .register(DurationDecoder)
            .register(ParsedDecoder)
            .register(EnumDecoder)
            .register(ListDecoder)
            .register(MapDecoder)
            .register(RecordDecoder)
            .register(SumDecoder)
            .register(AnyDecoder);
        registry
    }

    pub fn register(&mut self, decoder: impl Decoder + 'static) -> &mut Self {
        self.decoders.push(Arc::new(decoder));
        self
    }

    pub fn register_arc(&mut self, decoder: Arc<dyn Decoder>) -> &mut Self {
        self.decoders.push(decoder);
        self
    }

    /// The highest-priority decoder supporting `desc`; the earliest
    /// registered one on a tie.
    pub fn find(&self, desc: &TypeDesc) -> Option<&Arc<dyn Decoder>> {
        let mut best: Option<&Arc<dyn Decoder>> = None;
        for decoder in self.decoders.iter().filter(|d| d.supports(desc)) {
            match best {
                Some(current) if current.priority() >= decoder.priority() => {}
                _ => best = Some(decoder),
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decoders.iter().map(|d| d.name()))
            .finish()
    }
}

/// Read-only state shared by one decode.
pub struct DecoderContext<'a> {
    pub registry: &'a DecoderRegistry,
    pub resolvers: &'a [Arc<dyn Resolver>],
    pub mappers: &'a [Arc<dyn ParameterMapper>],
    /// Fall back to case- and separator-insensitive key matching.
    pub normalize_keys: bool,
    /// Discriminator key for sum types that do not declare their own.
    pub discriminator: Option<&'a str>,
    /// The whole preprocessed tree.
    pub root: &'a Node,
    pub secret_policy: &'a dyn SecretPolicy,
    pub reporter: &'a Reporter,
}

impl<'a> DecoderContext<'a> {
    /// Decode `node` as `desc`.
    pub fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath) -> ConfigValidation<Value> {
        self.decode_field(None, node, desc, path)
    }

    /// Decode `node` as the value of the record field `param`.
    pub fn decode_field(
        &self,
        param: Option<&str>,
        node: &Node,
        desc: &TypeDesc,
        path: &DotPath,
    ) -> ConfigValidation<Value> {
        let rendered = path.to_string();
        let node = match self.apply_resolvers(param, desc, node, &rendered) {
            Validation::Success(node) => node,
            Validation::Failure(errors) => return Validation::Failure(errors),
        };
        if desc.is_secret() || node.meta("secret").is_some() {
            self.reporter.mark_secret(&rendered);
        }
        self.decode_resolved(&node, desc, path)
    }

    fn apply_resolvers(
        &self,
        param: Option<&str>,
        desc: &TypeDesc,
        node: &Node,
        path: &str,
    ) -> ConfigValidation<Node> {
        let mut current = node.clone();
        for resolver in self.resolvers {
            current = match resolver.resolve(param, desc, &current, path, self) {
                Validation::Success(next) => next,
                Validation::Failure(errors) => return Validation::Failure(errors),
            };
        }
        Validation::Success(current)
    }

    fn decode_resolved(&self, node: &Node, desc: &TypeDesc, path: &DotPath) -> ConfigValidation<Value> {
        match node {
            Node::Undefined => match desc {
                TypeDesc::Optional(_) | TypeDesc::Any => return Validation::Success(Value::Null),
                TypeDesc::Record(record) if record.all_defaulted() => {}
                _ => {
                    return ConfigValidation::fail_with(ConfigError::MissingValue {
                        path: path.to_string(),
                        expected_type: desc.type_name(),
                        searched_keys: Vec::new(),
                        source_location: None,
                    })
                }
            },
            Node::Null { .. } => {
                self.reporter.mark_used(path);
                if desc.is_nullable() {
                    return Validation::Success(Value::Null);
                }
                return ConfigValidation::fail_with(ConfigError::NullValue {
                    path: path.to_string(),
                    expected_type: desc.type_name(),
                    source_location: node.pos().cloned(),
                });
            }
            _ => {}
        }

        if let TypeDesc::Optional(inner) = desc {
            return self.decode_resolved(node, inner, path);
        }

        let node = match node {
            Node::Map { value, .. } if desc.is_scalar() && value.is_defined() => value.as_ref(),
            other => other,
        };
        let consumes_subtree = matches!(desc, TypeDesc::Any | TypeDesc::Custom { .. });
        if node.is_defined() && (!node.is_map() || consumes_subtree) {
            self.reporter.mark_used(path);
        }

        let Some(decoder) = self.registry.find(desc) else {
            return ConfigValidation::fail_with(ConfigError::UnsupportedType {
                path: path.to_string(),
                type_name: desc.type_name(),
            });
        };
        tracing::trace!(path = %path, decoder = decoder.name(), target = %desc.type_name(), "decoding");
        decoder.decode(node, desc, path, self)
    }
}

/// A `TypeMismatch` for `node` at `path`.
pub fn mismatch(node: &Node, desc: &TypeDesc, path: &DotPath, message: impl Into<String>) -> ConfigError {
    ConfigError::TypeMismatch {
        path: path.to_string(),
        source_location: node.pos().cloned(),
        expected_type: desc.type_name(),
        actual_value: describe_actual(node),
        message: message.into(),
    }
}

fn describe_actual(node: &Node) -> String {
    match node {
        Node::String { value, .. } => format!("'{}'", value),
        Node::Map { .. } | Node::List { .. } => node.type_name().to_string(),
        other => other.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::describe::Describe;
    use crate::error::SourceLocation;
    use crate::node::NodeInfo;
    use crate::resolver::FnResolver;
    use serde_json::json;

    struct LoudStrings;

    impl Decoder for LoudStrings {
        fn name(&self) -> &str {
            "loud"
        }

        fn supports(&self, desc: &TypeDesc) -> bool {
            matches!(desc, TypeDesc::String)
        }

        fn priority(&self) -> i32 {
            10
        }

        fn decode(
            &self,
            node: &Node,
            _desc: &TypeDesc,
            _path: &DotPath,
            _ctx: &DecoderContext<'_>,
        ) -> ConfigValidation<Value> {
            Validation::Success(Value::String(
                node.scalar_text().unwrap_or_default().to_uppercase(),
            ))
        }
    }

    #[test]
    fn test_registry_priority() {
        let mut registry = DecoderRegistry::with_defaults();
        assert_eq!(registry.find(&TypeDesc::String).map(|d| d.name()), Some("string"));
        registry.register(LoudStrings);
        assert_eq!(registry.find(&TypeDesc::String).map(|d| d.name()), Some("loud"));
        assert!(registry.find(&TypeDesc::Custom { name: "X".into() }).is_none());
    }

    #[test]
    fn test_optional_absent_and_null() {
        let desc = <Option<u16>>::describe();
        assert_eq!(ok(decode_node(&desc, &Node::Undefined)), Value::Null);
        assert_eq!(ok(decode_json(&desc, json!(null))), Value::Null);
        assert_eq!(ok(decode_json(&desc, json!(8080))), json!(8080));
    }

    #[test]
    fn test_missing_and_null_for_required() {
        let errs = errors(decode_node(&u16::describe(), &Node::Undefined));
        assert!(matches!(errs[0], ConfigError::MissingValue { .. }));

        let errs = errors(decode_json(&u16::describe(), json!(null)));
        assert!(matches!(errs[0], ConfigError::NullValue { .. }));
    }

    #[test]
    fn test_unsupported_type() {
        let errs = errors(decode_json(&TypeDesc::Custom { name: "Color".into() }, json!("red")));
        match &errs[0] {
            ConfigError::UnsupportedType { type_name, .. } => assert_eq!(type_name, "Color"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_scalar_reads_map_own_value() {
        let mut node = Node::Undefined;
        let base = DotPath::root();
        node.insert_at(&[], Node::string("42", NodeInfo::new(base.clone())), &base);
        node.insert_at(&["extra".to_string()], Node::string("x", NodeInfo::default()), &base);
        assert_eq!(ok(decode_node(&u32::describe(), &node)), json!(42));
    }

    #[test]
    fn test_resolvers_run_before_decoding() {
        let resolver: Arc<dyn Resolver> = Arc::new(FnResolver(
            |_: Option<&str>, _: &TypeDesc, node: &Node, _: &str, _: &DecoderContext<'_>| {
                match node {
                    Node::String { value, info } => {
                        Validation::Success(Node::string(value.trim(), info.clone()))
                    }
                    other => Validation::Success(other.clone()),
                }
            },
        ));
        let resolvers = vec![resolver];
        let node = Node::string(
            "  7 ",
            NodeInfo::at(DotPath::root(), SourceLocation::new("test")),
        );
        let options = Options {
            resolvers: &resolvers,
            ..Options::default()
        };
        let value = ok(decode_with(&u8::describe(), &node, options));
        assert_eq!(value, json!(7));
    }
}
