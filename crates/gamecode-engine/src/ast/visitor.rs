//! Traversal protocols over the node arena.
//!
//! Two contracts cover every pass in the pipeline:
//!
//! - [`Visitor`]: top-down, pre-order. The handler runs before the node's
//!   children, receives the parent id, and returns whether to descend
//!   (default: descend). Descent order determines emitted instruction order
//!   during code generation.
//! - [`Transformer`]: bottom-up. Children are transformed and replaced
//!   first; the handler may then return a replacement node for the slot.
//!
//! Both recurse uniformly through scalar fields, single children, and
//! ordered child sequences via [`Ast::children`]. Parent links never
//! participate in traversal.

use super::{Ast, Node, NodeId};

/// Top-down visitor. Each hook returns whether to descend into the node's
/// children.
pub trait Visitor {
    fn visit_unit(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_use(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_namespace(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_struct(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_enum(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_alias(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_interface(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_interface_fn(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_var(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_fn_decl(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_fn_def(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_param(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_if(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_for(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_match(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_match_case(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_return(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_block(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_binary(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_unary(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_cast(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_call(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_path(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_scoped_name(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_subscript(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_number(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_string(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_type_ref(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_decoration(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_compose(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
    fn visit_decorator_def(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        true
    }
}

/// Dispatch one node to its [`Visitor`] hook.
fn dispatch<V: Visitor + ?Sized>(
    v: &mut V,
    ast: &Ast,
    id: NodeId,
    parent: Option<NodeId>,
) -> bool {
    match ast.node(id) {
        Node::Unit(_) => v.visit_unit(ast, id, parent),
        Node::Use(_) => v.visit_use(ast, id, parent),
        Node::Namespace(_) => v.visit_namespace(ast, id, parent),
        Node::Struct(_) => v.visit_struct(ast, id, parent),
        Node::Enum(_) => v.visit_enum(ast, id, parent),
        Node::Alias(_) => v.visit_alias(ast, id, parent),
        Node::Interface(_) => v.visit_interface(ast, id, parent),
        Node::InterfaceFn(_) => v.visit_interface_fn(ast, id, parent),
        Node::Var(_) => v.visit_var(ast, id, parent),
        Node::FnDecl(_) => v.visit_fn_decl(ast, id, parent),
        Node::FnDef(_) => v.visit_fn_def(ast, id, parent),
        Node::Param(_) => v.visit_param(ast, id, parent),
        Node::If(_) => v.visit_if(ast, id, parent),
        Node::For(_) => v.visit_for(ast, id, parent),
        Node::Match(_) => v.visit_match(ast, id, parent),
        Node::MatchCase(_) => v.visit_match_case(ast, id, parent),
        Node::Return(_) => v.visit_return(ast, id, parent),
        Node::Block(_) => v.visit_block(ast, id, parent),
        Node::Binary(_) => v.visit_binary(ast, id, parent),
        Node::Unary(_) => v.visit_unary(ast, id, parent),
        Node::Cast(_) => v.visit_cast(ast, id, parent),
        Node::Call(_) => v.visit_call(ast, id, parent),
        Node::Path(_) => v.visit_path(ast, id, parent),
        Node::ScopedName(_) => v.visit_scoped_name(ast, id, parent),
        Node::Subscript(_) => v.visit_subscript(ast, id, parent),
        Node::Number(_) => v.visit_number(ast, id, parent),
        Node::String(_) => v.visit_string(ast, id, parent),
        Node::TypeRef(_) => v.visit_type_ref(ast, id, parent),
        Node::Decoration(_) => v.visit_decoration(ast, id, parent),
        Node::Compose(_) => v.visit_compose(ast, id, parent),
        Node::DecoratorDef(_) => v.visit_decorator_def(ast, id, parent),
    }
}

/// Walk a subtree top-down, pre-order.
pub fn walk<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, id: NodeId, parent: Option<NodeId>) {
    if dispatch(v, ast, id, parent) {
        for child in ast.children(id) {
            walk(v, ast, child, Some(id));
        }
    }
}

/// Bottom-up transformer. Children are already transformed when a hook
/// runs; returning `Some(node)` replaces the node in its arena slot (ids
/// stay stable, so parents and other references are unaffected).
pub trait Transformer {
    /// Hook invoked for every node after its children. The default keeps
    /// the node unchanged.
    fn transform_node(&mut self, _ast: &Ast, _id: NodeId) -> Option<Node> {
        None
    }
}

/// Transform a subtree bottom-up.
pub fn transform<T: Transformer + ?Sized>(t: &mut T, ast: &mut Ast, id: NodeId) {
    for child in ast.children(id) {
        transform(t, ast, child);
    }
    if let Some(replacement) = t.transform_node(ast, id) {
        ast.replace(id, replacement);
    }
}

/// Record each node's syntactic parent. Runs once per unit, before
/// decorators; decorator closures navigate to siblings and ancestors
/// through these links.
pub fn link_parents(ast: &mut Ast) {
    let Some(root) = ast.root() else { return };
    link_from(ast, root, None);
}

fn link_from(ast: &mut Ast, id: NodeId, parent: Option<NodeId>) {
    ast.set_parent(id, parent);
    for child in ast.children(id) {
        link_from(ast, child, Some(id));
    }
}
