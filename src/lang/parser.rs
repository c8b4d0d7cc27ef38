//! Front end. Source is parsed by `rustpython-parser` and the resulting
//! tree is lowered into [`crate::lang::ast`], rejecting every construct the
//! sandbox dialect leaves out.

use std::rc::Rc;

use num_bigint::BigInt;
use rustpython_parser::ast::{self as py, Ranged};
use rustpython_parser::Parse;

use crate::lang::ast::*;
use crate::lang::fault::{Fault, FaultResult};

/// Expression nesting beyond this is rejected before lowering or evaluation
/// can recurse that deep on the host stack.
const MAX_EXPR_DEPTH: usize = 1000;
const MAX_BLOCK_DEPTH: usize = 100;

pub fn parse(source: &str) -> FaultResult<Program> {
    let lines = LineIndex::new(source);
    let suite = py::Suite::parse(source, "<string>")
        .map_err(|err| parse_error(&err.error.to_string(), usize::from(err.offset), &lines))?;

    if let Err(fault) = check_depth(&suite, &lines) {
        dismantle(suite);
        return Err(fault);
    }

    let mut lowering = Lowering {
        lines: &lines,
        function_depth: 0,
        loop_depth: 0,
    };
    let body = lowering.block(&suite)?;
    resolve_nonlocals(&body, &mut Vec::new())?;
    Ok(Program { body })
}

fn parse_error(message: &str, offset: usize, lines: &LineIndex) -> Fault {
    let line = lines.line(offset);
    let lower = message.to_lowercase();
    if lower.starts_with("inconsistent use of tab") {
        Fault::tab_error("inconsistent use of tabs and spaces in indentation", line)
    } else if lower.starts_with("unexpected indent")
        || lower.starts_with("expected an indented block")
        || lower.starts_with("unindent")
    {
        Fault::indentation(message, line)
    } else if lower.contains("eof") {
        Fault::syntax("unexpected EOF while parsing", line)
    } else if message.starts_with("invalid syntax") || message.starts_with("Got") {
        Fault::syntax("invalid syntax", line)
    } else {
        Fault::syntax(message, line)
    }
}

/// Byte offset to 1-based line number.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(at, _)| at + 1));
        Self { starts }
    }

    fn line(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(at) => at + 1,
            Err(at) => at,
        }
    }
}

fn ident(name: &py::Identifier) -> String {
    name.as_str().to_owned()
}

// ----------------------------------------------------------------------
// Nesting limits
// ----------------------------------------------------------------------

enum Node<'a> {
    Stmt(&'a py::Stmt),
    Expr(&'a py::Expr),
}

/// Walks the parsed tree with an explicit stack, tracking statement and
/// expression nesting.
struct DepthWalk<'a> {
    pending: Vec<(Node<'a>, usize, usize)>,
}

fn check_depth(suite: &[py::Stmt], lines: &LineIndex) -> FaultResult<()> {
    let mut walk = DepthWalk {
        pending: Vec::new(),
    };
    walk.body(suite, 0);
    while let Some((node, blocks, exprs)) = walk.pending.pop() {
        match node {
            Node::Stmt(stmt) => {
                if blocks >= MAX_BLOCK_DEPTH {
                    let line = lines.line(usize::from(stmt.range().start()));
                    return Err(Fault::indentation("too many levels of indentation", line));
                }
                walk.stmt(stmt, blocks);
            }
            Node::Expr(expr) => {
                if exprs > MAX_EXPR_DEPTH {
                    return Err(Fault::recursion_while("during compilation"));
                }
                walk.expr(expr, blocks, exprs);
            }
        }
    }
    Ok(())
}

impl<'a> DepthWalk<'a> {
    fn body(&mut self, body: &'a [py::Stmt], blocks: usize) {
        self.pending
            .extend(body.iter().map(|stmt| (Node::Stmt(stmt), blocks, 0)));
    }

    fn push(&mut self, expr: &'a py::Expr, blocks: usize, exprs: usize) {
        self.pending.push((Node::Expr(expr), blocks, exprs + 1));
    }

    fn push_opt(&mut self, expr: &'a Option<Box<py::Expr>>, blocks: usize, exprs: usize) {
        if let Some(expr) = expr {
            self.push(expr, blocks, exprs);
        }
    }

    fn push_all(&mut self, exprs_in: &'a [py::Expr], blocks: usize, exprs: usize) {
        for expr in exprs_in {
            self.push(expr, blocks, exprs);
        }
    }

    fn arguments(&mut self, args: &'a py::Arguments, blocks: usize, exprs: usize) {
        for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
            self.push_opt(&arg.def.annotation, blocks, exprs);
            self.push_opt(&arg.default, blocks, exprs);
        }
        for arg in args.vararg.iter().chain(&args.kwarg) {
            self.push_opt(&arg.annotation, blocks, exprs);
        }
    }

    fn comprehensions(&mut self, generators: &'a [py::Comprehension], blocks: usize, exprs: usize) {
        for generator in generators {
            self.push(&generator.target, blocks, exprs);
            self.push(&generator.iter, blocks, exprs);
            self.push_all(&generator.ifs, blocks, exprs);
        }
    }

    fn stmt(&mut self, stmt: &'a py::Stmt, blocks: usize) {
        let inner = blocks + 1;
        match stmt {
            py::Stmt::FunctionDef(py::StmtFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            })
            | py::Stmt::AsyncFunctionDef(py::StmtAsyncFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => {
                self.arguments(args, blocks, 0);
                self.push_all(decorator_list, blocks, 0);
                self.push_opt(returns, blocks, 0);
                self.body(body, inner);
            }
            py::Stmt::ClassDef(py::StmtClassDef {
                bases,
                keywords,
                body,
                decorator_list,
                ..
            }) => {
                self.push_all(bases, blocks, 0);
                for keyword in keywords {
                    self.push(&keyword.value, blocks, 0);
                }
                self.push_all(decorator_list, blocks, 0);
                self.body(body, inner);
            }
            py::Stmt::Return(py::StmtReturn { value, .. }) => self.push_opt(value, blocks, 0),
            py::Stmt::Delete(py::StmtDelete { targets, .. }) => self.push_all(targets, blocks, 0),
            py::Stmt::Assign(py::StmtAssign { targets, value, .. }) => {
                self.push_all(targets, blocks, 0);
                self.push(value, blocks, 0);
            }
            py::Stmt::AugAssign(py::StmtAugAssign { target, value, .. }) => {
                self.push(target, blocks, 0);
                self.push(value, blocks, 0);
            }
            py::Stmt::AnnAssign(py::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                self.push(target, blocks, 0);
                self.push(annotation, blocks, 0);
                self.push_opt(value, blocks, 0);
            }
            py::Stmt::For(py::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            })
            | py::Stmt::AsyncFor(py::StmtAsyncFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.push(target, blocks, 0);
                self.push(iter, blocks, 0);
                self.body(body, inner);
                self.body(orelse, inner);
            }
            py::Stmt::While(py::StmtWhile {
                test, body, orelse, ..
            })
            | py::Stmt::If(py::StmtIf {
                test, body, orelse, ..
            }) => {
                self.push(test, blocks, 0);
                self.body(body, inner);
                self.body(orelse, inner);
            }
            py::Stmt::With(py::StmtWith { items, body, .. })
            | py::Stmt::AsyncWith(py::StmtAsyncWith { items, body, .. }) => {
                for item in items {
                    self.push(&item.context_expr, blocks, 0);
                    self.push_opt(&item.optional_vars, blocks, 0);
                }
                self.body(body, inner);
            }
            py::Stmt::Match(py::StmtMatch { subject, cases, .. }) => {
                self.push(subject, blocks, 0);
                for case in cases {
                    self.push_opt(&case.guard, blocks, 0);
                    self.body(&case.body, inner);
                }
            }
            py::Stmt::Raise(py::StmtRaise { exc, cause, .. }) => {
                self.push_opt(exc, blocks, 0);
                self.push_opt(cause, blocks, 0);
            }
            py::Stmt::Try(py::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | py::Stmt::TryStar(py::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.body(body, inner);
                for handler in handlers {
                    let py::ExceptHandler::ExceptHandler(handler) = handler;
                    self.push_opt(&handler.type_, blocks, 0);
                    self.body(&handler.body, inner);
                }
                self.body(orelse, inner);
                self.body(finalbody, inner);
            }
            py::Stmt::Assert(py::StmtAssert { test, msg, .. }) => {
                self.push(test, blocks, 0);
                self.push_opt(msg, blocks, 0);
            }
            py::Stmt::Expr(py::StmtExpr { value, .. }) => self.push(value, blocks, 0),
            _ => {}
        }
    }

    fn expr(&mut self, expr: &'a py::Expr, blocks: usize, exprs: usize) {
        match expr {
            // `a and b and c` lowers to a chain as deep as its operand list.
            py::Expr::BoolOp(py::ExprBoolOp { values, .. }) => {
                self.push_all(values, blocks, exprs + values.len());
            }
            py::Expr::NamedExpr(py::ExprNamedExpr { target, value, .. }) => {
                self.push(target, blocks, exprs);
                self.push(value, blocks, exprs);
            }
            py::Expr::BinOp(py::ExprBinOp { left, right, .. }) => {
                self.push(left, blocks, exprs);
                self.push(right, blocks, exprs);
            }
            py::Expr::UnaryOp(py::ExprUnaryOp { operand, .. }) => self.push(operand, blocks, exprs),
            py::Expr::Lambda(py::ExprLambda { args, body, .. }) => {
                self.arguments(args, blocks, exprs);
                self.push(body, blocks, exprs);
            }
            py::Expr::IfExp(py::ExprIfExp {
                test, body, orelse, ..
            }) => {
                self.push(test, blocks, exprs);
                self.push(body, blocks, exprs);
                self.push(orelse, blocks, exprs);
            }
            py::Expr::Dict(py::ExprDict { keys, values, .. }) => {
                for key in keys.iter().flatten() {
                    self.push(key, blocks, exprs);
                }
                self.push_all(values, blocks, exprs);
            }
            py::Expr::Set(py::ExprSet { elts, .. })
            | py::Expr::List(py::ExprList { elts, .. })
            | py::Expr::Tuple(py::ExprTuple { elts, .. }) => self.push_all(elts, blocks, exprs),
            py::Expr::ListComp(py::ExprListComp {
                elt, generators, ..
            })
            | py::Expr::SetComp(py::ExprSetComp {
                elt, generators, ..
            })
            | py::Expr::GeneratorExp(py::ExprGeneratorExp {
                elt, generators, ..
            }) => {
                self.push(elt, blocks, exprs);
                self.comprehensions(generators, blocks, exprs);
            }
            py::Expr::DictComp(py::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                self.push(key, blocks, exprs);
                self.push(value, blocks, exprs);
                self.comprehensions(generators, blocks, exprs);
            }
            py::Expr::Await(py::ExprAwait { value, .. })
            | py::Expr::YieldFrom(py::ExprYieldFrom { value, .. })
            | py::Expr::Attribute(py::ExprAttribute { value, .. })
            | py::Expr::Starred(py::ExprStarred { value, .. }) => self.push(value, blocks, exprs),
            py::Expr::Yield(py::ExprYield { value, .. }) => self.push_opt(value, blocks, exprs),
            py::Expr::Compare(py::ExprCompare {
                left, comparators, ..
            }) => {
                self.push(left, blocks, exprs);
                self.push_all(comparators, blocks, exprs);
            }
            py::Expr::Call(py::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                self.push(func, blocks, exprs);
                self.push_all(args, blocks, exprs);
                for keyword in keywords {
                    self.push(&keyword.value, blocks, exprs);
                }
            }
            py::Expr::FormattedValue(py::ExprFormattedValue {
                value, format_spec, ..
            }) => {
                self.push(value, blocks, exprs);
                self.push_opt(format_spec, blocks, exprs);
            }
            py::Expr::JoinedStr(py::ExprJoinedStr { values, .. }) => {
                self.push_all(values, blocks, exprs)
            }
            py::Expr::Subscript(py::ExprSubscript { value, slice, .. }) => {
                self.push(value, blocks, exprs);
                self.push(slice, blocks, exprs);
            }
            py::Expr::Slice(py::ExprSlice {
                lower, upper, step, ..
            }) => {
                self.push_opt(lower, blocks, exprs);
                self.push_opt(upper, blocks, exprs);
                self.push_opt(step, blocks, exprs);
            }
            _ => {}
        }
    }
}

enum Owned {
    Stmt(py::Stmt),
    Expr(py::Expr),
}

/// Takes a rejected tree apart node by node so that dropping it never
/// recurses through its full depth.
fn dismantle(suite: Vec<py::Stmt>) {
    let mut pending: Vec<Owned> = suite.into_iter().map(Owned::Stmt).collect();
    while let Some(node) = pending.pop() {
        let mut take = Take(&mut pending);
        match node {
            Owned::Stmt(stmt) => take.stmt(stmt),
            Owned::Expr(expr) => take.expr(expr),
        }
    }
}

struct Take<'a>(&'a mut Vec<Owned>);

impl Take<'_> {
    fn boxed(&mut self, expr: Box<py::Expr>) {
        self.0.push(Owned::Expr(*expr));
    }

    fn opt(&mut self, expr: Option<Box<py::Expr>>) {
        if let Some(expr) = expr {
            self.boxed(expr);
        }
    }

    fn exprs(&mut self, exprs: Vec<py::Expr>) {
        self.0.extend(exprs.into_iter().map(Owned::Expr));
    }

    fn body(&mut self, body: Vec<py::Stmt>) {
        self.0.extend(body.into_iter().map(Owned::Stmt));
    }

    fn arguments(&mut self, args: Box<py::Arguments>) {
        let py::Arguments {
            posonlyargs,
            args,
            vararg,
            kwonlyargs,
            kwarg,
            ..
        } = *args;
        for arg in posonlyargs.into_iter().chain(args).chain(kwonlyargs) {
            self.opt(arg.def.annotation);
            self.opt(arg.default);
        }
        for arg in vararg.into_iter().chain(kwarg) {
            self.opt(arg.annotation);
        }
    }

    fn comprehensions(&mut self, generators: Vec<py::Comprehension>) {
        for generator in generators {
            self.0.push(Owned::Expr(generator.target));
            self.0.push(Owned::Expr(generator.iter));
            self.exprs(generator.ifs);
        }
    }

    fn stmt(&mut self, stmt: py::Stmt) {
        match stmt {
            py::Stmt::FunctionDef(py::StmtFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            })
            | py::Stmt::AsyncFunctionDef(py::StmtAsyncFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => {
                self.arguments(args);
                self.exprs(decorator_list);
                self.opt(returns);
                self.body(body);
            }
            py::Stmt::ClassDef(py::StmtClassDef {
                bases,
                keywords,
                body,
                decorator_list,
                ..
            }) => {
                self.exprs(bases);
                self.exprs(keywords.into_iter().map(|keyword| keyword.value).collect());
                self.exprs(decorator_list);
                self.body(body);
            }
            py::Stmt::Return(py::StmtReturn { value, .. }) => self.opt(value),
            py::Stmt::Delete(py::StmtDelete { targets, .. }) => self.exprs(targets),
            py::Stmt::Assign(py::StmtAssign { targets, value, .. }) => {
                self.exprs(targets);
                self.boxed(value);
            }
            py::Stmt::AugAssign(py::StmtAugAssign { target, value, .. }) => {
                self.boxed(target);
                self.boxed(value);
            }
            py::Stmt::AnnAssign(py::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                self.boxed(target);
                self.boxed(annotation);
                self.opt(value);
            }
            py::Stmt::For(py::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            })
            | py::Stmt::AsyncFor(py::StmtAsyncFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.boxed(target);
                self.boxed(iter);
                self.body(body);
                self.body(orelse);
            }
            py::Stmt::While(py::StmtWhile {
                test, body, orelse, ..
            })
            | py::Stmt::If(py::StmtIf {
                test, body, orelse, ..
            }) => {
                self.boxed(test);
                self.body(body);
                self.body(orelse);
            }
            py::Stmt::With(py::StmtWith { items, body, .. })
            | py::Stmt::AsyncWith(py::StmtAsyncWith { items, body, .. }) => {
                for item in items {
                    self.0.push(Owned::Expr(item.context_expr));
                    self.opt(item.optional_vars);
                }
                self.body(body);
            }
            py::Stmt::Match(py::StmtMatch { subject, cases, .. }) => {
                self.boxed(subject);
                for case in cases {
                    self.opt(case.guard);
                    self.body(case.body);
                }
            }
            py::Stmt::Raise(py::StmtRaise { exc, cause, .. }) => {
                self.opt(exc);
                self.opt(cause);
            }
            py::Stmt::Try(py::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | py::Stmt::TryStar(py::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.body(body);
                for handler in handlers {
                    let py::ExceptHandler::ExceptHandler(handler) = handler;
                    self.opt(handler.type_);
                    self.body(handler.body);
                }
                self.body(orelse);
                self.body(finalbody);
            }
            py::Stmt::Assert(py::StmtAssert { test, msg, .. }) => {
                self.boxed(test);
                self.opt(msg);
            }
            py::Stmt::Expr(py::StmtExpr { value, .. }) => self.boxed(value),
            _ => {}
        }
    }

    fn expr(&mut self, expr: py::Expr) {
        match expr {
            py::Expr::BoolOp(py::ExprBoolOp { values, .. }) => self.exprs(values),
            py::Expr::NamedExpr(py::ExprNamedExpr { target, value, .. }) => {
                self.boxed(target);
                self.boxed(value);
            }
            py::Expr::BinOp(py::ExprBinOp { left, right, .. }) => {
                self.boxed(left);
                self.boxed(right);
            }
            py::Expr::UnaryOp(py::ExprUnaryOp { operand, .. }) => self.boxed(operand),
            py::Expr::Lambda(py::ExprLambda { args, body, .. }) => {
                self.arguments(args);
                self.boxed(body);
            }
            py::Expr::IfExp(py::ExprIfExp {
                test, body, orelse, ..
            }) => {
                self.boxed(test);
                self.boxed(body);
                self.boxed(orelse);
            }
            py::Expr::Dict(py::ExprDict { keys, values, .. }) => {
                self.exprs(keys.into_iter().flatten().collect());
                self.exprs(values);
            }
            py::Expr::Set(py::ExprSet { elts, .. })
            | py::Expr::List(py::ExprList { elts, .. })
            | py::Expr::Tuple(py::ExprTuple { elts, .. }) => self.exprs(elts),
            py::Expr::ListComp(py::ExprListComp {
                elt, generators, ..
            })
            | py::Expr::SetComp(py::ExprSetComp {
                elt, generators, ..
            })
            | py::Expr::GeneratorExp(py::ExprGeneratorExp {
                elt, generators, ..
            }) => {
                self.boxed(elt);
                self.comprehensions(generators);
            }
            py::Expr::DictComp(py::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                self.boxed(key);
                self.boxed(value);
                self.comprehensions(generators);
            }
            py::Expr::Await(py::ExprAwait { value, .. })
            | py::Expr::YieldFrom(py::ExprYieldFrom { value, .. })
            | py::Expr::Attribute(py::ExprAttribute { value, .. })
            | py::Expr::Starred(py::ExprStarred { value, .. }) => self.boxed(value),
            py::Expr::Yield(py::ExprYield { value, .. }) => self.opt(value),
            py::Expr::Compare(py::ExprCompare {
                left, comparators, ..
            }) => {
                self.boxed(left);
                self.exprs(comparators);
            }
            py::Expr::Call(py::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                self.boxed(func);
                self.exprs(args);
                self.exprs(keywords.into_iter().map(|keyword| keyword.value).collect());
            }
            py::Expr::FormattedValue(py::ExprFormattedValue {
                value, format_spec, ..
            }) => {
                self.boxed(value);
                self.opt(format_spec);
            }
            py::Expr::JoinedStr(py::ExprJoinedStr { values, .. }) => self.exprs(values),
            py::Expr::Subscript(py::ExprSubscript { value, slice, .. }) => {
                self.boxed(value);
                self.boxed(slice);
            }
            py::Expr::Slice(py::ExprSlice {
                lower, upper, step, ..
            }) => {
                self.opt(lower);
                self.opt(upper);
                self.opt(step);
            }
            _ => {}
        }
    }
}

// ----------------------------------------------------------------------
// Lowering
// ----------------------------------------------------------------------

struct Lowering<'l> {
    lines: &'l LineIndex,
    function_depth: usize,
    loop_depth: usize,
}

impl Lowering<'_> {
    fn line(&self, node: &impl Ranged) -> usize {
        self.lines.line(usize::from(node.range().start()))
    }

    fn block(&mut self, body: &[py::Stmt]) -> FaultResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            out.push(self.statement(stmt)?);
        }
        Ok(out)
    }

    fn loop_body(&mut self, body: &[py::Stmt]) -> FaultResult<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.block(body);
        self.loop_depth -= 1;
        body
    }

    /// Lowers a body that runs in its own frame: `return` becomes legal and
    /// enclosing loops stop counting.
    fn frame_body(&mut self, body: &[py::Stmt], function: bool) -> FaultResult<Vec<Stmt>> {
        let saved_loop = std::mem::replace(&mut self.loop_depth, 0);
        if function {
            self.function_depth += 1;
        }
        let body = self.block(body);
        if function {
            self.function_depth -= 1;
        }
        self.loop_depth = saved_loop;
        body
    }

    fn targets(&mut self, targets: &[py::Expr], action: &str) -> FaultResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(targets.len());
        for target in targets {
            let target = self.expr(target)?;
            check_target(&target, action)?;
            out.push(target);
        }
        Ok(out)
    }

    fn opt(&mut self, expr: &Option<Box<py::Expr>>) -> FaultResult<Option<Expr>> {
        match expr {
            Some(expr) => Ok(Some(self.expr(expr)?)),
            None => Ok(None),
        }
    }

    fn statement(&mut self, stmt: &py::Stmt) -> FaultResult<Stmt> {
        let line = self.line(stmt);
        let unsupported = |what: &str| Err(Fault::syntax(format!("{} are not supported", what), line));

        let kind = match stmt {
            py::Stmt::Expr(py::StmtExpr { value, .. }) => StmtKind::Expr(self.expr(value)?),
            py::Stmt::Assign(py::StmtAssign { targets, value, .. }) => {
                let targets = self.targets(targets, "assign to")?;
                StmtKind::Assign(targets, self.expr(value)?)
            }
            py::Stmt::AugAssign(py::StmtAugAssign {
                target, op, value, ..
            }) => {
                let target = self.expr(target)?;
                let illegal = match target.kind {
                    ExprKind::Name(_) | ExprKind::Subscript(..) | ExprKind::Attribute(..) => None,
                    ExprKind::Tuple(_) => Some("tuple"),
                    ExprKind::List(_) => Some("list"),
                    _ => Some("expression"),
                };
                if let Some(what) = illegal {
                    return Err(Fault::syntax(
                        format!("'{}' is an illegal expression for augmented assignment", what),
                        line,
                    ));
                }
                let op = operator(op, line)?;
                StmtKind::AugAssign(target, op, self.expr(value)?)
            }
            // The annotation is never evaluated.
            py::Stmt::AnnAssign(py::StmtAnnAssign { target, value, .. }) => {
                let target = self.expr(target)?;
                check_target(&target, "assign to")?;
                match value {
                    Some(value) => StmtKind::Assign(vec![target], self.expr(value)?),
                    None => StmtKind::Pass,
                }
            }
            py::Stmt::If(py::StmtIf {
                test, body, orelse, ..
            }) => {
                let test = self.expr(test)?;
                StmtKind::If(test, self.block(body)?, self.block(orelse)?)
            }
            py::Stmt::While(py::StmtWhile {
                test, body, orelse, ..
            }) => {
                let test = self.expr(test)?;
                let body = self.loop_body(body)?;
                StmtKind::While(test, body, self.block(orelse)?)
            }
            py::Stmt::For(py::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                let target = self.expr(target)?;
                check_target(&target, "assign to")?;
                let iter = self.expr(iter)?;
                let body = self.loop_body(body)?;
                StmtKind::For(target, iter, body, self.block(orelse)?)
            }
            py::Stmt::Pass(_) => StmtKind::Pass,
            py::Stmt::Break(_) if self.loop_depth == 0 => {
                return Err(Fault::syntax("'break' outside loop", line))
            }
            py::Stmt::Break(_) => StmtKind::Break,
            py::Stmt::Continue(_) if self.loop_depth == 0 => {
                return Err(Fault::syntax("'continue' not properly in loop", line))
            }
            py::Stmt::Continue(_) => StmtKind::Continue,
            py::Stmt::FunctionDef(py::StmtFunctionDef {
                name,
                args,
                body,
                decorator_list,
                ..
            }) => {
                if !decorator_list.is_empty() {
                    return unsupported("decorators");
                }
                let (params, vararg) = self.parameters(args, line)?;
                let body = self.frame_body(body, true)?;
                let def = build_function(ident(name), params, vararg, body, line)?;
                StmtKind::FunctionDef(Rc::new(def))
            }
            // The body is lowered for syntax errors only; defining the class
            // always fails at run time.
            py::Stmt::ClassDef(py::StmtClassDef { name, body, .. }) => {
                self.frame_body(body, false)?;
                StmtKind::ClassDef(ident(name))
            }
            py::Stmt::Return(_) if self.function_depth == 0 => {
                return Err(Fault::syntax("'return' outside function", line))
            }
            py::Stmt::Return(py::StmtReturn { value, .. }) => StmtKind::Return(self.opt(value)?),
            py::Stmt::Global(py::StmtGlobal { names, .. }) => {
                StmtKind::Global(names.iter().map(ident).collect())
            }
            py::Stmt::Nonlocal(_) if self.function_depth == 0 => {
                return Err(Fault::syntax(
                    "nonlocal declaration not allowed at module level",
                    line,
                ))
            }
            py::Stmt::Nonlocal(py::StmtNonlocal { names, .. }) => {
                StmtKind::Nonlocal(names.iter().map(ident).collect())
            }
            py::Stmt::Delete(py::StmtDelete { targets, .. }) => {
                StmtKind::Delete(self.targets(targets, "delete")?)
            }
            py::Stmt::Assert(py::StmtAssert { test, msg, .. }) => {
                let test = self.expr(test)?;
                StmtKind::Assert(test, self.opt(msg)?)
            }
            // The cause is lowered for syntax errors only.
            py::Stmt::Raise(py::StmtRaise { exc, cause, .. }) => {
                let exc = self.opt(exc)?;
                self.opt(cause)?;
                StmtKind::Raise(exc)
            }
            py::Stmt::Try(py::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                let body = self.block(body)?;
                let mut lowered = Vec::with_capacity(handlers.len());
                for handler in handlers {
                    let py::ExceptHandler::ExceptHandler(handler) = handler;
                    let kind = self.opt(&handler.type_)?;
                    lowered.push(ExceptHandler {
                        kind,
                        name: handler.name.as_ref().map(ident),
                        body: self.block(&handler.body)?,
                        line: self.line(handler),
                    });
                }
                StmtKind::Try {
                    body,
                    handlers: lowered,
                    orelse: self.block(orelse)?,
                    finalbody: self.block(finalbody)?,
                }
            }
            py::Stmt::Import(py::StmtImport { names, .. }) => {
                StmtKind::Import(names.first().map(|alias| ident(&alias.name)).unwrap_or_default())
            }
            py::Stmt::ImportFrom(py::StmtImportFrom { module, .. }) => {
                StmtKind::Import(module.as_ref().map(ident).unwrap_or_default())
            }
            py::Stmt::With(_) => return unsupported("'with' statements"),
            py::Stmt::Match(_) => return unsupported("'match' statements"),
            py::Stmt::TryStar(_) => return unsupported("'except*' clauses"),
            py::Stmt::AsyncFunctionDef(_) | py::Stmt::AsyncFor(_) | py::Stmt::AsyncWith(_) => {
                return unsupported("'async' statements")
            }
            _ => return Err(Fault::syntax("invalid syntax", line)),
        };
        Ok(Stmt { kind, line })
    }

    fn parameters(
        &mut self,
        args: &py::Arguments,
        line: usize,
    ) -> FaultResult<(Vec<Param>, Option<String>)> {
        if !args.kwonlyargs.is_empty() {
            return Err(Fault::syntax("keyword-only parameters are not supported", line));
        }
        if args.kwarg.is_some() {
            return Err(Fault::syntax(
                "keyword argument collectors are not supported",
                line,
            ));
        }
        let duplicate = |name: &str| {
            Fault::syntax(
                format!("duplicate argument '{}' in function definition", name),
                line,
            )
        };

        let mut params: Vec<Param> = Vec::new();
        for arg in args.posonlyargs.iter().chain(&args.args) {
            let name = ident(&arg.def.arg);
            if params.iter().any(|p| p.name == name) {
                return Err(duplicate(&name));
            }
            let default = self.opt(&arg.default)?;
            params.push(Param { name, default });
        }
        let vararg = args.vararg.as_ref().map(|arg| ident(&arg.arg));
        if let Some(vararg) = &vararg {
            if params.iter().any(|p| &p.name == vararg) {
                return Err(duplicate(vararg));
            }
        }
        Ok((params, vararg))
    }

    fn comprehensions(
        &mut self,
        generators: &[py::Comprehension],
        line: usize,
    ) -> FaultResult<Vec<Comprehension>> {
        let mut clauses = Vec::with_capacity(generators.len());
        for generator in generators {
            if generator.is_async {
                return Err(Fault::syntax("asynchronous comprehensions are not supported", line));
            }
            let target = self.expr(&generator.target)?;
            check_target(&target, "assign to")?;
            let iter = self.expr(&generator.iter)?;
            let mut conditions = Vec::with_capacity(generator.ifs.len());
            for condition in &generator.ifs {
                conditions.push(self.expr(condition)?);
            }
            clauses.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(clauses)
    }

    fn boxed(&mut self, expr: &py::Expr) -> FaultResult<Box<Expr>> {
        Ok(Box::new(self.expr(expr)?))
    }

    fn exprs(&mut self, exprs: &[py::Expr]) -> FaultResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            out.push(self.expr(expr)?);
        }
        Ok(out)
    }

    fn expr(&mut self, expr: &py::Expr) -> FaultResult<Expr> {
        let line = self.line(expr);
        let unsupported = |what: &str| Err(Fault::syntax(format!("{} are not supported", what), line));

        let kind = match expr {
            py::Expr::Constant(py::ExprConstant { value, .. }) => constant(value, line)?,
            py::Expr::Name(py::ExprName { id, .. }) => ExprKind::Name(ident(id)),
            py::Expr::BoolOp(py::ExprBoolOp { op, values, .. }) => {
                let mut values = values.iter();
                let Some(first) = values.next() else {
                    return Err(Fault::syntax("invalid syntax", line));
                };
                let mut chain = self.expr(first)?;
                for value in values {
                    let (left, right) = (Box::new(chain), self.boxed(value)?);
                    let kind = match op {
                        py::BoolOp::And => ExprKind::BoolAnd(left, right),
                        py::BoolOp::Or => ExprKind::BoolOr(left, right),
                    };
                    chain = Expr::new(kind, line);
                }
                return Ok(chain);
            }
            py::Expr::BinOp(py::ExprBinOp {
                left, op, right, ..
            }) => {
                let op = operator(op, line)?;
                ExprKind::Binary(op, self.boxed(left)?, self.boxed(right)?)
            }
            py::Expr::UnaryOp(py::ExprUnaryOp { op, operand, .. }) => {
                let op = match op {
                    py::UnaryOp::Not => UnaryOp::Not,
                    py::UnaryOp::USub => UnaryOp::Neg,
                    py::UnaryOp::UAdd => UnaryOp::Pos,
                    py::UnaryOp::Invert => UnaryOp::Invert,
                };
                ExprKind::Unary(op, self.boxed(operand)?)
            }
            py::Expr::Lambda(py::ExprLambda { args, body, .. }) => {
                let (params, vararg) = self.parameters(args, line)?;
                self.function_depth += 1;
                let body = self.expr(body);
                self.function_depth -= 1;
                let body = body?;
                let ret = Stmt {
                    line: body.line,
                    kind: StmtKind::Return(Some(body)),
                };
                let def = build_function("<lambda>".to_string(), params, vararg, vec![ret], line)?;
                ExprKind::Lambda(Rc::new(def))
            }
            py::Expr::IfExp(py::ExprIfExp {
                test, body, orelse, ..
            }) => ExprKind::IfExp {
                test: self.boxed(test)?,
                body: self.boxed(body)?,
                orelse: self.boxed(orelse)?,
            },
            py::Expr::Dict(py::ExprDict { keys, values, .. }) => {
                let mut entries = Vec::with_capacity(values.len());
                for (key, value) in keys.iter().zip(values) {
                    let Some(key) = key else {
                        return unsupported("dict unpackings");
                    };
                    entries.push((self.expr(key)?, self.expr(value)?));
                }
                ExprKind::Dict(entries)
            }
            py::Expr::Set(_) | py::Expr::SetComp(_) => return unsupported("set displays"),
            py::Expr::ListComp(py::ExprListComp {
                elt, generators, ..
            })
            | py::Expr::GeneratorExp(py::ExprGeneratorExp {
                elt, generators, ..
            }) => {
                let elt = self.boxed(elt)?;
                ExprKind::ListComp(elt, self.comprehensions(generators, line)?)
            }
            py::Expr::DictComp(py::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                let (key, value) = (self.boxed(key)?, self.boxed(value)?);
                ExprKind::DictComp(key, value, self.comprehensions(generators, line)?)
            }
            py::Expr::NamedExpr(_) => return unsupported("assignment expressions"),
            py::Expr::Await(_) => return unsupported("'await' expressions"),
            py::Expr::Yield(_) | py::Expr::YieldFrom(_) => return unsupported("'yield' expressions"),
            py::Expr::Compare(py::ExprCompare {
                left,
                ops,
                comparators,
                ..
            }) => {
                let left = self.boxed(left)?;
                let mut rest = Vec::with_capacity(comparators.len());
                for (op, comparator) in ops.iter().zip(comparators) {
                    rest.push((compare_op(op), self.expr(comparator)?));
                }
                ExprKind::Compare(left, rest)
            }
            py::Expr::Call(py::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                let func = self.boxed(func)?;
                let mut lowered = Vec::with_capacity(args.len() + keywords.len());
                for arg in args {
                    lowered.push(match arg {
                        py::Expr::Starred(py::ExprStarred { value, .. }) => {
                            Arg::Starred(self.expr(value)?)
                        }
                        other => Arg::Positional(self.expr(other)?),
                    });
                }
                for keyword in keywords {
                    let Some(name) = &keyword.arg else {
                        return unsupported("keyword argument unpackings");
                    };
                    lowered.push(Arg::Keyword(ident(name), self.expr(&keyword.value)?));
                }
                ExprKind::Call(func, lowered)
            }
            py::Expr::JoinedStr(py::ExprJoinedStr { values, .. }) => {
                ExprKind::FString(self.fstring_parts(values)?)
            }
            py::Expr::FormattedValue(field) => ExprKind::FString(vec![self.fstring_field(field)?]),
            py::Expr::Attribute(py::ExprAttribute { value, attr, .. }) => {
                ExprKind::Attribute(self.boxed(value)?, ident(attr))
            }
            py::Expr::Subscript(py::ExprSubscript { value, slice, .. }) => {
                ExprKind::Subscript(self.boxed(value)?, self.boxed(slice)?)
            }
            py::Expr::Starred(py::ExprStarred { value, .. }) => ExprKind::Starred(self.boxed(value)?),
            py::Expr::List(py::ExprList { elts, .. }) => ExprKind::List(self.exprs(elts)?),
            py::Expr::Tuple(py::ExprTuple { elts, .. }) => ExprKind::Tuple(self.exprs(elts)?),
            py::Expr::Slice(py::ExprSlice {
                lower, upper, step, ..
            }) => {
                let lower = self.opt(lower)?.map(Box::new);
                let upper = self.opt(upper)?.map(Box::new);
                ExprKind::Slice(lower, upper, self.opt(step)?.map(Box::new))
            }
        };
        Ok(Expr::new(kind, line))
    }

    /// Adjacent literals merge; nested joined strings are flattened.
    fn fstring_parts(&mut self, values: &[py::Expr]) -> FaultResult<Vec<FStringPart>> {
        let mut parts = Vec::new();
        for value in values {
            match value {
                py::Expr::Constant(py::ExprConstant {
                    value: py::Constant::Str(text),
                    ..
                }) => push_literal(&mut parts, text),
                py::Expr::FormattedValue(field) => parts.push(self.fstring_field(field)?),
                py::Expr::JoinedStr(py::ExprJoinedStr { values, .. }) => {
                    for part in self.fstring_parts(values)? {
                        match part {
                            FStringPart::Literal(text) => push_literal(&mut parts, &text),
                            field => parts.push(field),
                        }
                    }
                }
                other => return Err(Fault::syntax("f-string: invalid syntax", self.line(other))),
            }
        }
        Ok(parts)
    }

    fn fstring_field(&mut self, field: &py::ExprFormattedValue) -> FaultResult<FStringPart> {
        let expr = self.expr(&field.value)?;
        let conversion = match field.conversion {
            py::ConversionFlag::Str => Some('s'),
            py::ConversionFlag::Repr => Some('r'),
            py::ConversionFlag::Ascii => Some('a'),
            py::ConversionFlag::None => None,
        };
        let spec = match field.format_spec.as_deref() {
            Some(py::Expr::JoinedStr(py::ExprJoinedStr { values, .. })) => {
                self.fstring_parts(values)?
            }
            Some(other) => self.fstring_parts(std::slice::from_ref(other))?,
            None => Vec::new(),
        };
        Ok(FStringPart::Field {
            expr,
            conversion,
            spec,
        })
    }
}

fn constant(value: &py::Constant, line: usize) -> FaultResult<ExprKind> {
    let unsupported = |what: &str| Err(Fault::syntax(format!("{} are not supported", what), line));
    Ok(match value {
        py::Constant::None => ExprKind::None,
        py::Constant::Bool(b) => ExprKind::Bool(*b),
        py::Constant::Str(text) => ExprKind::Str(text.clone()),
        py::Constant::Int(value) => {
            let value = value
                .to_string()
                .parse::<BigInt>()
                .map_err(|_| Fault::syntax("invalid decimal literal", line))?;
            ExprKind::Int(value)
        }
        py::Constant::Float(f) => ExprKind::Float(*f),
        py::Constant::Bytes(_) => return unsupported("bytes literals"),
        py::Constant::Complex { .. } => return unsupported("complex literals"),
        py::Constant::Ellipsis => return Err(Fault::syntax("Ellipsis is not supported", line)),
        py::Constant::Tuple(_) => return Err(Fault::syntax("invalid syntax", line)),
    })
}

fn operator(op: &py::Operator, line: usize) -> FaultResult<BinOp> {
    Ok(match op {
        py::Operator::Add => BinOp::Add,
        py::Operator::Sub => BinOp::Sub,
        py::Operator::Mult => BinOp::Mul,
        py::Operator::Div => BinOp::Div,
        py::Operator::FloorDiv => BinOp::FloorDiv,
        py::Operator::Mod => BinOp::Mod,
        py::Operator::Pow => BinOp::Pow,
        py::Operator::LShift => BinOp::LShift,
        py::Operator::RShift => BinOp::RShift,
        py::Operator::BitOr => BinOp::BitOr,
        py::Operator::BitXor => BinOp::BitXor,
        py::Operator::BitAnd => BinOp::BitAnd,
        py::Operator::MatMult => {
            return Err(Fault::syntax("the '@' operator is not supported", line))
        }
    })
}

fn compare_op(op: &py::CmpOp) -> CmpOp {
    match op {
        py::CmpOp::Eq => CmpOp::Eq,
        py::CmpOp::NotEq => CmpOp::NotEq,
        py::CmpOp::Lt => CmpOp::Lt,
        py::CmpOp::LtE => CmpOp::LtE,
        py::CmpOp::Gt => CmpOp::Gt,
        py::CmpOp::GtE => CmpOp::GtE,
        py::CmpOp::Is => CmpOp::Is,
        py::CmpOp::IsNot => CmpOp::IsNot,
        py::CmpOp::In => CmpOp::In,
        py::CmpOp::NotIn => CmpOp::NotIn,
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if let Some(FStringPart::Literal(existing)) = parts.last_mut() {
        existing.push_str(text);
    } else {
        parts.push(FStringPart::Literal(text.to_string()));
    }
}

// ----------------------------------------------------------------------
// Scope analysis
// ----------------------------------------------------------------------

fn check_target(target: &Expr, action: &str) -> FaultResult<()> {
    match &target.kind {
        ExprKind::Name(_) | ExprKind::Subscript(..) | ExprKind::Attribute(..) => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            let starred = items
                .iter()
                .filter(|i| matches!(i.kind, ExprKind::Starred(_)))
                .count();
            if starred > 1 {
                return Err(Fault::syntax(
                    "multiple starred expressions in assignment",
                    target.line,
                ));
            }
            items.iter().try_for_each(|item| check_target(item, action))
        }
        ExprKind::Starred(inner) if action != "delete" => check_target(inner, action),
        ExprKind::Call(..) => Err(Fault::syntax(
            format!("cannot {} function call", action),
            target.line,
        )),
        ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::None => Err(Fault::syntax(
            format!("cannot {} literal", action),
            target.line,
        )),
        _ => Err(Fault::syntax(
            format!("cannot {} expression", action),
            target.line,
        )),
    }
}

fn build_function(
    name: String,
    params: Vec<Param>,
    vararg: Option<String>,
    body: Vec<Stmt>,
    line: usize,
) -> FaultResult<FunctionDef> {
    let mut scope = ScopeCollector::default();
    for param in &params {
        scope.bind(&param.name);
    }
    if let Some(vararg) = &vararg {
        scope.bind(vararg);
    }
    scope.block(&body);

    for name in &scope.globals {
        if params.iter().any(|p| &p.name == name) {
            return Err(Fault::syntax(
                format!("name '{}' is parameter and global", name),
                line,
            ));
        }
    }
    for name in &scope.nonlocals {
        if params.iter().any(|p| &p.name == name) {
            return Err(Fault::syntax(
                format!("name '{}' is parameter and nonlocal", name),
                line,
            ));
        }
    }

    let locals = scope
        .bound
        .into_iter()
        .filter(|n| !scope.globals.contains(n) && !scope.nonlocals.contains(n))
        .collect();

    Ok(FunctionDef {
        name,
        params,
        vararg,
        body,
        locals,
        globals: scope.globals,
        nonlocals: scope.nonlocals,
    })
}

/// Collects every name a function body binds so that the interpreter can
/// apply local-variable semantics.
#[derive(Default)]
struct ScopeCollector {
    bound: Vec<String>,
    globals: Vec<String>,
    nonlocals: Vec<String>,
}

impl ScopeCollector {
    fn bind(&mut self, name: &str) {
        if !self.bound.iter().any(|n| n == name) {
            self.bound.push(name.to_string());
        }
    }

    fn target(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Name(name) => self.bind(name),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                items.iter().for_each(|item| self.target(item))
            }
            ExprKind::Starred(inner) => self.target(inner),
            _ => {}
        }
    }

    fn block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign(targets, _) => targets.iter().for_each(|t| self.target(t)),
            StmtKind::AugAssign(target, _, _) => self.target(target),
            StmtKind::For(target, _, body, orelse) => {
                self.target(target);
                self.block(body);
                self.block(orelse);
            }
            StmtKind::If(_, body, orelse) | StmtKind::While(_, body, orelse) => {
                self.block(body);
                self.block(orelse);
            }
            StmtKind::FunctionDef(def) => self.bind(&def.name),
            StmtKind::ClassDef(name) => self.bind(name),
            StmtKind::Delete(targets) => targets.iter().for_each(|t| self.target(t)),
            StmtKind::Global(names) => {
                for name in names {
                    if !self.globals.contains(name) {
                        self.globals.push(name.clone());
                    }
                }
            }
            StmtKind::Nonlocal(names) => {
                for name in names {
                    if !self.nonlocals.contains(name) {
                        self.nonlocals.push(name.clone());
                    }
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.block(body);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        self.bind(name);
                    }
                    self.block(&handler.body);
                }
                self.block(orelse);
                self.block(finalbody);
            }
            _ => {}
        }
    }
}

/// Every `nonlocal` name must be bound by an enclosing function.
fn resolve_nonlocals<'a>(
    body: &'a [Stmt],
    enclosing: &mut Vec<&'a FunctionDef>,
) -> FaultResult<()> {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Nonlocal(names) => {
                let outer = &enclosing[..enclosing.len().saturating_sub(1)];
                for name in names {
                    let bound = outer
                        .iter()
                        .any(|def| def.locals.contains(name) || def.nonlocals.contains(name));
                    if !bound {
                        return Err(Fault::syntax(
                            format!("no binding for nonlocal '{}' found", name),
                            stmt.line,
                        ));
                    }
                }
            }
            StmtKind::FunctionDef(def) => {
                enclosing.push(def.as_ref());
                let result = resolve_nonlocals(&def.body, enclosing);
                enclosing.pop();
                result?;
            }
            StmtKind::If(_, body, orelse)
            | StmtKind::While(_, body, orelse)
            | StmtKind::For(_, _, body, orelse) => {
                resolve_nonlocals(body, enclosing)?;
                resolve_nonlocals(orelse, enclosing)?;
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                resolve_nonlocals(body, enclosing)?;
                for handler in handlers {
                    resolve_nonlocals(&handler.body, enclosing)?;
                }
                resolve_nonlocals(orelse, enclosing)?;
                resolve_nonlocals(finalbody, enclosing)?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_stmt(source: &str) -> StmtKind {
        parse(source).unwrap().body.remove(0).kind
    }

    #[test]
    fn test_assignment_and_expression() {
        assert!(matches!(first_stmt("x = 1"), StmtKind::Assign(..)));
        assert!(matches!(first_stmt("print('hi')"), StmtKind::Expr(_)));
        assert!(matches!(first_stmt("x += 2"), StmtKind::AugAssign(_, BinOp::Add, _)));
    }

    #[test]
    fn test_chained_assignment_targets() {
        match first_stmt("a = b = 3") {
            StmtKind::Assign(targets, value) => {
                assert_eq!(targets.len(), 2);
                assert_eq!(value.kind, ExprKind::Int(BigInt::from(3)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_big_int_literal() {
        match first_stmt("123456789012345678901234567890") {
            StmtKind::Expr(expr) => assert_eq!(
                expr.kind,
                ExprKind::Int("123456789012345678901234567890".parse().unwrap())
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_operator_precedence() {
        match first_stmt("1 + 2 * 3") {
            StmtKind::Expr(Expr {
                kind: ExprKind::Binary(BinOp::Add, _, right),
                ..
            }) => assert!(matches!(right.kind, ExprKind::Binary(BinOp::Mul, _, _))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        match first_stmt("-2 ** 2") {
            StmtKind::Expr(Expr {
                kind: ExprKind::Unary(UnaryOp::Neg, inner),
                ..
            }) => assert!(matches!(inner.kind, ExprKind::Binary(BinOp::Pow, _, _))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bool_chain_nests_left() {
        match first_stmt("a or b or c") {
            StmtKind::Expr(Expr {
                kind: ExprKind::BoolOr(left, _),
                ..
            }) => assert!(matches!(left.kind, ExprKind::BoolOr(..))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_locals_are_collected() {
        match first_stmt("def f(a):\n    b = a\n    for c in b:\n        pass\n    global g\n    g = 1\n") {
            StmtKind::FunctionDef(def) => {
                assert_eq!(def.locals, vec!["a", "b", "c"]);
                assert_eq!(def.globals, vec!["g"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fstring_fields() {
        match first_stmt("f'a{x!r:>4}b'") {
            StmtKind::Expr(Expr {
                kind: ExprKind::FString(parts),
                ..
            }) => {
                assert_eq!(parts.len(), 3);
                match &parts[1] {
                    FStringPart::Field {
                        conversion, spec, ..
                    } => {
                        assert_eq!(*conversion, Some('r'));
                        assert_eq!(spec, &vec![FStringPart::Literal(">4".into())]);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors_carry_line() {
        let err = parse("x = 1\ny = (\n").unwrap_err();
        assert_eq!(err.exception, "SyntaxError");
        let err = parse("x = 1\nx = = 2").unwrap_err();
        assert_eq!(err.message, "invalid syntax (<string>, line 2)");
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_return_outside_function() {
        let err = parse("return 1").unwrap_err();
        assert!(err.message.starts_with("'return' outside function"));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = parse("break").unwrap_err();
        assert!(err.message.starts_with("'break' outside loop"));
        let err = parse("for x in y:\n    def f():\n        break\n").unwrap_err();
        assert!(err.message.starts_with("'break' outside loop"));
    }

    #[test]
    fn test_deep_expression_is_rejected() {
        let source = format!("x = 1{}", " + 1".repeat(5000));
        let err = parse(&source).unwrap_err();
        assert_eq!(err.exception, "RecursionError");
        assert_eq!(err.message, "maximum recursion depth exceeded during compilation");

        let within = format!("x = 1{}", " + 1".repeat(500));
        assert!(parse(&within).is_ok());
    }

    #[test]
    fn test_deep_blocks_are_rejected() {
        let mut source = String::new();
        for depth in 0..101 {
            source.push_str(&" ".repeat(depth));
            source.push_str("if x:\n");
        }
        source.push_str(&" ".repeat(101));
        source.push_str("pass\n");
        let err = parse(&source).unwrap_err();
        assert_eq!(err.exception, "IndentationError");
        assert!(err.message.starts_with("too many levels of indentation"));
    }

    #[test]
    fn test_cannot_assign_to_literal() {
        let err = parse("1 = x").unwrap_err();
        assert_eq!(err.exception, "SyntaxError");
    }

    #[test]
    fn test_import_and_class_parse() {
        assert_eq!(first_stmt("import os"), StmtKind::Import("os".into()));
        assert_eq!(
            first_stmt("from os.path import join as j"),
            StmtKind::Import("os.path".into())
        );
        assert_eq!(
            first_stmt("class A:\n    pass\n"),
            StmtKind::ClassDef("A".into())
        );
    }

    #[test]
    fn test_unsupported_constructs_are_rejected() {
        let err = parse("s = {1, 2}").unwrap_err();
        assert!(err.message.starts_with("set displays are not supported"));
        let err = parse("with x:\n    pass\n").unwrap_err();
        assert!(err.message.starts_with("'with' statements are not supported"));
        let err = parse("@d\ndef f():\n    pass\n").unwrap_err();
        assert!(err.message.starts_with("decorators are not supported"));
        let err = parse("def f(**kw):\n    pass\n").unwrap_err();
        assert!(err.message.starts_with("keyword argument collectors"));
    }

    #[test]
    fn test_unexpected_indent() {
        let err = parse("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.exception, "IndentationError");
    }

    #[test]
    fn test_mixed_tabs_and_spaces() {
        let err = parse("if x:\n        y = 1\n\tz = 2\n").unwrap_err();
        assert_eq!(err.exception, "TabError");
        assert!(err.message.starts_with("inconsistent use of tabs and spaces"));
    }

    #[test]
    fn test_nonlocal_needs_an_enclosing_binding() {
        let err = parse("def f():\n    nonlocal q\n").unwrap_err();
        assert_eq!(err.exception, "SyntaxError");
        assert_eq!(err.message, "no binding for nonlocal 'q' found (<string>, line 2)");

        let err = parse("def f():\n    global q\n    def g():\n        nonlocal q\n").unwrap_err();
        assert!(err.message.starts_with("no binding for nonlocal 'q' found"));

        let nested = "def f():\n    q = 0\n    def g():\n        def h():\n            nonlocal q\n";
        assert!(parse(nested).is_ok());
    }

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new("a\nbc\n\nd");
        assert_eq!(lines.line(0), 1);
        assert_eq!(lines.line(2), 2);
        assert_eq!(lines.line(3), 2);
        assert_eq!(lines.line(5), 3);
        assert_eq!(lines.line(6), 4);
        assert_eq!(lines.line(100), 4);
    }
}
