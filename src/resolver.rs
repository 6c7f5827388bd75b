//! Type-aware node resolvers.
//!
//! A [`Resolver`] sees every node just before it is decoded, together with
//! the target type and the field name it feeds. It can replace the node or
//! reject it; the built-in [`WeakSecretResolver`](crate::secret::WeakSecretResolver)
//! uses this to fail on weak secrets.

use crate::decoder::DecoderContext;
use crate::describe::TypeDesc;
use crate::error::ConfigValidation;
use crate::node::Node;

/// Rewrites or rejects a node ahead of decoding.
pub trait Resolver: Send + Sync {
    /// `param_name` is the record field being filled, if any; `path` is the
    /// rendered diagnostic path of `node`.
    fn resolve(
        &self,
        param_name: Option<&str>,
        desc: &TypeDesc,
        node: &Node,
        path: &str,
        ctx: &DecoderContext<'_>,
    ) -> ConfigValidation<Node>;
}

/// Adapts a closure into a [`Resolver`].
///
/// ```ignore
/// let trim = FnResolver(|_, _, node: &Node, _, _| match node {
///     Node::String { value, info } => Validation::Success(Node::string(value.trim(), info.clone())),
///     other => Validation::Success(other.clone()),
/// });
/// ```
pub struct FnResolver<F>(pub F);

impl<F> Resolver for FnResolver<F>
where
    F: Fn(Option<&str>, &TypeDesc, &Node, &str, &DecoderContext<'_>) -> ConfigValidation<Node>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        param_name: Option<&str>,
        desc: &TypeDesc,
        node: &Node,
        path: &str,
        ctx: &DecoderContext<'_>,
    ) -> ConfigValidation<Node> {
        (self.0)(param_name, desc, node, path, ctx)
    }
}
