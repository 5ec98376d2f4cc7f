// resolve.rs — Name resolution and IR construction for hlsopt sources
//
// Walks the parsed AST, resolves array, induction-variable and buffer names,
// and builds the `ir::Module` consumed by the optimization passes. `set`
// statements are folded into the source-level `Options`.
//
// Preconditions: `program` is a well-formed AST from the parser.
// Postconditions: returns the module, the source options and all accumulated
//                 diagnostics. The module is only meaningful when no
//                 error-level diagnostic was produced.
// Failure modes: unknown names, duplicate definitions, rank mismatches and
//                bad constants produce `Diagnostic` entries. Resolution
//                continues past errors.
// Side effects: none.

use std::collections::HashMap;

use crate::ast::*;
use crate::diag::codes;
use crate::diag::Diagnostic;
use crate::expr::{BinOp, Expr};
use crate::id::{ArrayId, IdAllocator};
use crate::ir::{
    Access, AccessKind, Array, Loop, LoopItem, LoopNest, MemRefType, Module,
};
use crate::pipeline::Options;

// ── Public types ────────────────────────────────────────────────────────────

/// Result of name resolution.
#[derive(Debug)]
pub struct ResolveResult {
    pub module: Module,
    /// Options set by `set` statements, on top of the defaults.
    pub options: Options,
    pub diagnostics: Vec<Diagnostic>,
}

/// Keys accepted by `set`.
pub const KNOWN_SETTINGS: &[&str] = &["ignore_violations"];

// ── Entry point ─────────────────────────────────────────────────────────────

/// Resolve all names in `program` and build the IR.
pub fn resolve(program: &Program) -> ResolveResult {
    let mut resolver = Resolver::new();
    resolver.collect_arrays(program);
    for stmt in &program.statements {
        match &stmt.kind {
            StatementKind::Set(set) => resolver.resolve_set(set),
            StatementKind::Array(_) => {}
            StatementKind::Loop(lp) => resolver.resolve_nest(lp),
            StatementKind::Region(region) => resolver.resolve_region(region),
        }
    }
    ResolveResult {
        module: resolver.module,
        options: resolver.options,
        diagnostics: resolver.diagnostics,
    }
}

// ── Resolver ────────────────────────────────────────────────────────────────

struct Resolver {
    module: Module,
    options: Options,
    diagnostics: Vec<Diagnostic>,
    ids: IdAllocator,
    arrays: HashMap<String, ArrayId>,
}

/// Induction variables of the nest being resolved.
struct NestScope {
    /// All induction variables of the nest, in declaration order.
    names: Vec<String>,
    /// Currently visible variables, innermost last: (name, position).
    visible: Vec<(String, u32)>,
}

impl NestScope {
    fn lookup(&self, name: &str) -> Option<u32> {
        self.visible
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|&(_, pos)| pos)
    }
}

impl Resolver {
    fn new() -> Self {
        Resolver {
            module: Module::default(),
            options: Options::default(),
            diagnostics: Vec::new(),
            ids: IdAllocator::new(),
            arrays: HashMap::new(),
        }
    }

    fn error(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    // ── Arrays ──

    /// Arrays are visible from every loop nest regardless of declaration
    /// order, so they are collected up front.
    fn collect_arrays(&mut self, program: &Program) {
        for stmt in &program.statements {
            let StatementKind::Array(decl) = &stmt.kind else {
                continue;
            };
            if self.arrays.contains_key(&decl.name.name) {
                self.error(Diagnostic::error(
                    codes::E0102,
                    decl.name.span,
                    format!("duplicate array '{}'", decl.name.name),
                ));
                continue;
            }

            let mut shape = Vec::with_capacity(decl.shape.len());
            for &(size, span) in &decl.shape {
                if size <= 0 {
                    self.error(
                        Diagnostic::error(
                            codes::E0104,
                            span,
                            format!("array '{}' has a zero-sized dimension", decl.name.name),
                        )
                        .with_hint("every dimension must be at least 1"),
                    );
                }
                shape.push(size.max(1) as u64);
            }

            let memory_space = match decl.memory_space {
                None => 0,
                Some((space, span)) => match u32::try_from(space) {
                    Ok(space) => space,
                    Err(_) => {
                        self.error(Diagnostic::error(
                            codes::E0108,
                            span,
                            format!("memory space {} is out of range", space),
                        ));
                        0
                    }
                },
            };

            let id = self.ids.alloc_array();
            self.arrays.insert(decl.name.name.clone(), id);
            self.module.arrays.push(Array {
                id,
                name: decl.name.name.clone(),
                ty: MemRefType {
                    shape,
                    element_type: decl.element_type.name.clone(),
                    layout: None,
                    memory_space,
                },
            });
        }
    }

    // ── Settings ──

    fn resolve_set(&mut self, set: &SetStmt) {
        match set.name.name.as_str() {
            "ignore_violations" => match parse_bool(&set.value) {
                Some(value) => self.options.ignore_violations = value,
                None => {
                    let span = match &set.value {
                        SetValue::Int(_, span) => *span,
                        SetValue::Ident(id) => id.span,
                    };
                    self.error(
                        Diagnostic::error(
                            codes::E0107,
                            span,
                            "'ignore_violations' expects a boolean",
                        )
                        .with_hint("use true, false, 1 or 0"),
                    );
                }
            },
            other => {
                self.diagnostics.push(
                    Diagnostic::warning(
                        codes::W0100,
                        set.name.span,
                        format!("unknown setting '{}' ignored", other),
                    )
                    .with_hint(format!("known settings: {}", KNOWN_SETTINGS.join(", "))),
                );
            }
        }
    }

    // ── Loop nests ──

    fn resolve_nest(&mut self, root: &LoopStmt) {
        let mut scope = NestScope {
            names: Vec::new(),
            visible: Vec::new(),
        };
        let root = self.resolve_loop(root, &mut scope);
        self.module.nests.push(LoopNest {
            root,
            induction_vars: scope.names,
        });
    }

    fn resolve_loop(&mut self, stmt: &LoopStmt, scope: &mut NestScope) -> Loop {
        if scope.lookup(&stmt.var.name).is_some() {
            self.error(Diagnostic::error(
                codes::E0102,
                stmt.var.span,
                format!(
                    "induction variable '{}' shadows an enclosing loop",
                    stmt.var.name
                ),
            ));
        }

        let step = match stmt.step {
            None => 1,
            Some((0, span)) => {
                self.error(Diagnostic::error(codes::E0105, span, "loop step must be non-zero"));
                1
            }
            Some((step, _)) => step,
        };

        let iv = scope.names.len() as u32;
        scope.names.push(stmt.var.name.clone());
        scope.visible.push((stmt.var.name.clone(), iv));
        let id = self.ids.alloc_loop();

        let mut body = Vec::with_capacity(stmt.body.len());
        for item in &stmt.body {
            match item {
                LoopBodyItem::Loop(inner) => {
                    body.push(LoopItem::Loop(self.resolve_loop(inner, scope)));
                }
                LoopBodyItem::Access(access) => {
                    if let Some(access) = self.resolve_access(access, scope) {
                        body.push(LoopItem::Access(access));
                    }
                }
            }
        }
        scope.visible.pop();

        Loop {
            id,
            iv,
            lower: stmt.lower,
            upper: stmt.upper,
            step,
            pipeline: stmt.pipeline,
            body,
        }
    }

    fn resolve_access(&mut self, stmt: &AccessStmt, scope: &NestScope) -> Option<Access> {
        let Some(&array) = self.arrays.get(&stmt.array.name) else {
            self.error(Diagnostic::error(
                codes::E0100,
                stmt.array.span,
                format!("unknown array '{}'", stmt.array.name),
            ));
            return None;
        };

        let rank = self.module.array(array).ty.rank();
        if stmt.indices.len() != rank {
            self.error(
                Diagnostic::error(
                    codes::E0103,
                    stmt.span,
                    format!(
                        "expected {} indices for '{}', found {}",
                        rank,
                        stmt.array.name,
                        stmt.indices.len()
                    ),
                )
                .with_hint(format!("array '{}' has rank {}", stmt.array.name, rank)),
            );
            return None;
        }

        let mut indices = Vec::with_capacity(rank);
        for index in &stmt.indices {
            indices.push(self.lower_index(index, scope)?);
        }

        Some(Access {
            array,
            indices,
            kind: if stmt.is_write {
                AccessKind::Write
            } else {
                AccessKind::Read
            },
        })
    }

    fn lower_index(&mut self, expr: &IndexExpr, scope: &NestScope) -> Option<Expr> {
        match expr {
            IndexExpr::Int(value, _) => Some(Expr::constant(*value)),
            IndexExpr::Var(ident) => match scope.lookup(&ident.name) {
                Some(pos) => Some(Expr::dim(pos)),
                None => {
                    self.error(Diagnostic::error(
                        codes::E0101,
                        ident.span,
                        format!("unknown induction variable '{}'", ident.name),
                    ));
                    None
                }
            },
            IndexExpr::Neg(inner, _) => Some(-self.lower_index(inner, scope)?),
            IndexExpr::Binary(op, lhs, rhs, _) => {
                // Lower both sides before bailing out so every unknown name
                // is reported.
                let lhs = self.lower_index(lhs, scope);
                let rhs = self.lower_index(rhs, scope);
                let (lhs, rhs) = (lhs?, rhs?);
                Some(match op {
                    IndexOp::Add => lhs + rhs,
                    IndexOp::Sub => lhs - rhs,
                    IndexOp::Mul => lhs * rhs,
                    IndexOp::Mod => Expr::binary(BinOp::Mod, lhs, rhs),
                    IndexOp::FloorDiv => Expr::binary(BinOp::FloorDiv, lhs, rhs),
                    IndexOp::CeilDiv => Expr::binary(BinOp::CeilDiv, lhs, rhs),
                })
            }
        }
    }

    // ── Dataflow regions ──

    fn resolve_region(&mut self, stmt: &RegionStmt) {
        if self.module.dataflow.region_by_name(&stmt.name.name).is_some() {
            self.error(Diagnostic::error(
                codes::E0102,
                stmt.name.span,
                format!("duplicate region '{}'", stmt.name.name),
            ));
            return;
        }

        let graph = &mut self.module.dataflow;
        let region = graph.add_region(stmt.name.name.clone(), stmt.name.span);
        let mut seen: HashMap<&str, Span> = HashMap::new();

        for node in &stmt.nodes {
            if let Some(first) = seen.get(node.name.name.as_str()) {
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::E0106,
                        node.name.span,
                        format!(
                            "node '{}' declared twice in region '{}'",
                            node.name.name, stmt.name.name
                        ),
                    )
                    .with_hint(format!("first declared at offset {}", first.start)),
                );
                continue;
            }
            seen.insert(node.name.name.as_str(), node.name.span);

            let inputs = node
                .inputs
                .iter()
                .map(|b| graph.intern_buffer(&b.name))
                .collect();
            let outputs = node
                .outputs
                .iter()
                .map(|b| graph.intern_buffer(&b.name))
                .collect();
            graph.add_node(region, node.name.name.clone(), inputs, outputs, node.span);
        }
    }
}

fn parse_bool(value: &SetValue) -> Option<bool> {
    match value {
        SetValue::Int(0, _) => Some(false),
        SetValue::Int(1, _) => Some(true),
        SetValue::Ident(id) if id.name == "false" => Some(false),
        SetValue::Ident(id) if id.name == "true" => Some(true),
        _ => None,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
