//! AST to TAC lowering.
//!
//! Expressions lower by maximal munch: every constructor either folds
//! straight into a caller-supplied destination temp or, lacking one,
//! mints a fresh one. Conditions lower through a dedicated branch
//! routine so that `&&`/`||` short-circuit and comparisons jump
//! straight off their `sub` rather than ever materializing a boolean
//! and testing it.

use std::collections::HashMap;

use bx_ast::{BinOp, Block, Expr, FunctionDecl, GlobalDecl, Stmt, UnOp};
use bx_core::{Dest, Global, Label, Op, Opcode, Operand, TacListing, Temp};

use crate::error::LowerError;

/// Where a bound name currently lives: a local temp (reused across
/// reassignment, since pre-SSA TAC doesn't version names) or a
/// module-level global (read/written through an explicit `copy`).
#[derive(Debug, Clone)]
enum VarSlot {
    Temp(Temp),
    Global(Global),
}

/// Builds the map a [`Lowerer`] consults for names that aren't local:
/// one [`Global`] per module-level declaration, keyed by source name.
pub fn global_map(globals: &[GlobalDecl]) -> HashMap<String, Global> {
    globals
        .iter()
        .map(|g| (g.name.clone(), Global(g.name.clone())))
        .collect()
}

/// Lowers one function to a flat [`TacListing`]. `globals` is shared
/// across every function in a program and should come from
/// [`global_map`].
pub fn lower_function(
    decl: &FunctionDecl,
    globals: &HashMap<String, Global>,
) -> Result<TacListing, LowerError> {
    let _span = tracing::debug_span!("lower_function", name = %decl.name).entered();

    let params: Vec<Temp> = decl
        .params
        .iter()
        .map(|p| Temp::Named(p.name.clone()))
        .collect();
    let mut lowerer = Lowerer::new(&decl.name, globals);
    lowerer.scope_stack.push(
        decl.params
            .iter()
            .zip(params.iter())
            .map(|(p, t)| (p.name.clone(), t.clone()))
            .collect(),
    );
    lowerer.listing = TacListing::new(decl.name.clone(), params);
    lowerer.listing.push_label(Label::new(decl.name.clone()));
    lowerer.lower_block(&decl.body)?;
    lowerer.listing.push_op(Op::new(Opcode::Ret, vec![], None));
    Ok(lowerer.listing)
}

struct Lowerer<'a> {
    fn_name: String,
    globals: &'a HashMap<String, Global>,
    scope_stack: Vec<HashMap<String, Temp>>,
    loop_stack: Vec<(Label, Label)>,
    temp_counter: u32,
    label_counter: u32,
    listing: TacListing,
}

impl<'a> Lowerer<'a> {
    fn new(fn_name: &str, globals: &'a HashMap<String, Global>) -> Self {
        Lowerer {
            fn_name: fn_name.to_string(),
            globals,
            scope_stack: Vec::new(),
            loop_stack: Vec::new(),
            temp_counter: 0,
            label_counter: 0,
            listing: TacListing::new(fn_name, vec![]),
        }
    }

    fn fresh_temp(&mut self) -> Temp {
        let t = Temp::Counter(self.temp_counter);
        self.temp_counter += 1;
        t
    }

    fn fresh_label(&mut self) -> Label {
        let l = Label::new(format!(".L{}.{}", self.fn_name, self.label_counter));
        self.label_counter += 1;
        l
    }

    fn push_scope(&mut self) {
        self.scope_stack.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn bind(&mut self, name: String, temp: Temp) {
        self.scope_stack
            .last_mut()
            .expect("a scope is always open while lowering a body")
            .insert(name, temp);
    }

    fn lookup(&self, name: &str) -> Result<VarSlot, LowerError> {
        for scope in self.scope_stack.iter().rev() {
            if let Some(t) = scope.get(name) {
                return Ok(VarSlot::Temp(t.clone()));
            }
        }
        if let Some(g) = self.globals.get(name) {
            return Ok(VarSlot::Global(g.clone()));
        }
        Err(LowerError::UnboundName(name.to_string()))
    }

    fn emit(&mut self, op: Op<Temp>) {
        self.listing.push_op(op);
    }

    fn emit_label(&mut self, label: Label) {
        self.listing.push_label(label);
    }

    fn emit_jmp(&mut self, target: Label) {
        self.emit(Op::new(Opcode::Jmp, vec![Operand::Label(target)], None));
    }

    // --- statements ----------------------------------------------------

    fn lower_block(&mut self, block: &Block) -> Result<(), LowerError> {
        for stmt in &block.0 {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match stmt {
            Stmt::Decl { name, ty: _, init } => {
                let var_temp = Temp::Named(name.clone());
                self.lower_expr_into(init, Some(var_temp.clone()))?;
                self.bind(name.clone(), var_temp);
                Ok(())
            }
            Stmt::Assign { name, expr } => {
                match self.lookup(name)? {
                    VarSlot::Temp(t) => {
                        self.lower_expr_into(expr, Some(t))?;
                    }
                    VarSlot::Global(g) => {
                        let v = self.lower_expr(expr)?;
                        self.emit(Op::new(
                            Opcode::Copy,
                            vec![Operand::Temp(v)],
                            Some(Dest::Global(g)),
                        ));
                    }
                }
                Ok(())
            }
            Stmt::Eval(expr) => {
                match expr {
                    Expr::Call { target, args } => {
                        self.lower_call(target, args)?;
                    }
                    _ => {
                        self.lower_expr(expr)?;
                    }
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_ref()),
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::Break => {
                let (_, lexit) = self
                    .loop_stack
                    .last()
                    .cloned()
                    .ok_or(LowerError::LoopMisplaced)?;
                self.emit_jmp(lexit);
                Ok(())
            }
            Stmt::Continue => {
                let (lhead, _) = self
                    .loop_stack
                    .last()
                    .cloned()
                    .ok_or(LowerError::LoopMisplaced)?;
                self.emit_jmp(lhead);
                Ok(())
            }
        }
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Block,
        else_branch: Option<&Block>,
    ) -> Result<(), LowerError> {
        let lthen = self.fresh_label();
        let ljoin = self.fresh_label();
        let lfalse = if else_branch.is_some() {
            self.fresh_label()
        } else {
            ljoin.clone()
        };

        self.lower_branch(cond, &lthen, &lfalse)?;

        self.emit_label(lthen);
        self.push_scope();
        self.lower_block(then_branch)?;
        self.pop_scope();
        self.emit_jmp(ljoin.clone());

        if let Some(els) = else_branch {
            self.emit_label(lfalse);
            self.push_scope();
            self.lower_block(els)?;
            self.pop_scope();
        }

        self.emit_label(ljoin);
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &Block) -> Result<(), LowerError> {
        let lhead = self.fresh_label();
        let lbody = self.fresh_label();
        let lexit = self.fresh_label();

        self.loop_stack.push((lhead.clone(), lexit.clone()));

        self.emit_label(lhead.clone());
        self.lower_branch(cond, &lbody, &lexit)?;

        self.emit_label(lbody);
        self.push_scope();
        self.lower_block(body)?;
        self.pop_scope();
        self.emit_jmp(lhead);

        self.emit_label(lexit);
        self.loop_stack.pop();
        Ok(())
    }

    // --- expressions -----------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr) -> Result<Temp, LowerError> {
        self.lower_expr_into(expr, None)
    }

    /// Lowers `expr`, writing its result into `target` when one is
    /// supplied instead of minting a fresh temp -- this is what makes
    /// `var x = 0;` emit `const 0 -> x` directly rather than a
    /// redundant `const 0 -> t0; copy t0 -> x`.
    fn lower_expr_into(&mut self, expr: &Expr, target: Option<Temp>) -> Result<Temp, LowerError> {
        match expr {
            Expr::Int(n) => {
                let dest = target.unwrap_or_else(|| self.fresh_temp());
                self.emit(Op::new(
                    Opcode::Const,
                    vec![Operand::Const(*n)],
                    Some(Dest::Temp(dest.clone())),
                ));
                Ok(dest)
            }
            Expr::Bool(b) => {
                let dest = target.unwrap_or_else(|| self.fresh_temp());
                self.emit(Op::new(
                    Opcode::Const,
                    vec![Operand::Const(if *b { 1 } else { 0 })],
                    Some(Dest::Temp(dest.clone())),
                ));
                Ok(dest)
            }
            Expr::Var(name) => match self.lookup(name)? {
                VarSlot::Temp(t) => match target {
                    Some(dest) if dest != t => {
                        self.emit(Op::new(
                            Opcode::Copy,
                            vec![Operand::Temp(t)],
                            Some(Dest::Temp(dest.clone())),
                        ));
                        Ok(dest)
                    }
                    Some(dest) => Ok(dest),
                    None => Ok(t),
                },
                VarSlot::Global(g) => {
                    let dest = target.unwrap_or_else(|| self.fresh_temp());
                    self.emit(Op::new(
                        Opcode::Copy,
                        vec![Operand::Global(g)],
                        Some(Dest::Temp(dest.clone())),
                    ));
                    Ok(dest)
                }
            },
            Expr::UnOp { op, expr } => {
                let arg = self.lower_expr(expr)?;
                let dest = target.unwrap_or_else(|| self.fresh_temp());
                match op {
                    UnOp::Neg => self.emit(Op::new(
                        Opcode::Neg,
                        vec![Operand::Temp(arg)],
                        Some(Dest::Temp(dest.clone())),
                    )),
                    UnOp::BitNot => self.emit(Op::new(
                        Opcode::Not,
                        vec![Operand::Temp(arg)],
                        Some(Dest::Temp(dest.clone())),
                    )),
                    UnOp::BoolNot => self.emit(Op::new(
                        Opcode::Xor,
                        vec![Operand::Temp(arg), Operand::Const(1)],
                        Some(Dest::Temp(dest.clone())),
                    )),
                }
                Ok(dest)
            }
            Expr::BinOp { op, left, right } => {
                if op.is_short_circuit() || op.is_relational() {
                    self.materialize_condition(expr, target)
                } else {
                    let lt = self.lower_expr(left)?;
                    let rt = self.lower_expr(right)?;
                    let dest = target.unwrap_or_else(|| self.fresh_temp());
                    let opcode = arithmetic_opcode(*op);
                    self.emit(Op::new(
                        opcode,
                        vec![Operand::Temp(lt), Operand::Temp(rt)],
                        Some(Dest::Temp(dest.clone())),
                    ));
                    Ok(dest)
                }
            }
            Expr::Call {
                target: callee,
                args,
            } => {
                let dest_hint = target.clone();
                match self.lower_call(callee, args)? {
                    Some(t) => match dest_hint {
                        Some(dest) if dest != t => {
                            self.emit(Op::new(
                                Opcode::Copy,
                                vec![Operand::Temp(t)],
                                Some(Dest::Temp(dest.clone())),
                            ));
                            Ok(dest)
                        }
                        Some(dest) => Ok(dest),
                        None => Ok(t),
                    },
                    None => {
                        // A void call used in value position never
                        // happens in a well-typed program; produce
                        // something rather than panic.
                        let dest = dest_hint.unwrap_or_else(|| self.fresh_temp());
                        self.emit(Op::new(
                            Opcode::Const,
                            vec![Operand::Const(0)],
                            Some(Dest::Temp(dest.clone())),
                        ));
                        Ok(dest)
                    }
                }
            }
        }
    }

    /// Calls through the generic protocol: one `param` per argument,
    /// then `call @target, argc`, with `argc` counting the callee
    /// itself (so `argc - 1` is the argument count). Every call,
    /// including `print`, goes through this path -- there's no
    /// special-cased built-in emission here; the dedicated `print`
    /// opcode in the IR model is for callers that build TAC directly.
    fn lower_call(&mut self, target: &str, args: &[Expr]) -> Result<Option<Temp>, LowerError> {
        let mut arg_temps = Vec::with_capacity(args.len());
        for arg in args {
            arg_temps.push(self.lower_expr(arg)?);
        }
        for (i, t) in arg_temps.into_iter().enumerate() {
            self.emit(Op::new(
                Opcode::Param,
                vec![Operand::Const((i + 1) as i64), Operand::Temp(t)],
                None,
            ));
        }
        let argc = (args.len() + 1) as i64;
        let dest = self.fresh_temp();
        self.emit(Op::new(
            Opcode::Call,
            vec![Operand::Global(Global(target.to_string())), Operand::Const(argc)],
            Some(Dest::Temp(dest.clone())),
        ));
        Ok(Some(dest))
    }

    /// Materializes a boolean-valued comparison or `&&`/`||` by
    /// branch-lowering it and folding the two outcomes into 0/1.
    fn materialize_condition(
        &mut self,
        expr: &Expr,
        target: Option<Temp>,
    ) -> Result<Temp, LowerError> {
        let ltrue = self.fresh_label();
        let lfalse = self.fresh_label();
        let ljoin = self.fresh_label();
        let dest = target.unwrap_or_else(|| self.fresh_temp());

        self.lower_branch(expr, &ltrue, &lfalse)?;

        self.emit_label(ltrue);
        self.emit(Op::new(
            Opcode::Const,
            vec![Operand::Const(1)],
            Some(Dest::Temp(dest.clone())),
        ));
        self.emit_jmp(ljoin.clone());

        self.emit_label(lfalse);
        self.emit(Op::new(
            Opcode::Const,
            vec![Operand::Const(0)],
            Some(Dest::Temp(dest.clone())),
        ));

        self.emit_label(ljoin);
        Ok(dest)
    }

    /// Lowers `expr` as a branch condition: jumps to `ltrue` if it
    /// holds, `lfalse` otherwise. Comparisons collapse to a single
    /// `sub` plus a conditional jump; `&&`/`||` short-circuit by
    /// threading an intermediate label instead of materializing
    /// either operand; `!e` flips the two targets and recurses.
    fn lower_branch(&mut self, expr: &Expr, ltrue: &Label, lfalse: &Label) -> Result<(), LowerError> {
        match expr {
            Expr::UnOp {
                op: UnOp::BoolNot,
                expr: inner,
            } => self.lower_branch(inner, lfalse, ltrue),
            Expr::BinOp { op, left, right } if op.is_relational() => {
                let lt = self.lower_expr(left)?;
                let rt = self.lower_expr(right)?;
                let diff = self.fresh_temp();
                self.emit(Op::new(
                    Opcode::Sub,
                    vec![Operand::Temp(lt), Operand::Temp(rt)],
                    Some(Dest::Temp(diff.clone())),
                ));
                let jcc = relational_jump(*op);
                self.emit(Op::new(
                    jcc,
                    vec![Operand::Temp(diff), Operand::Label(ltrue.clone())],
                    None,
                ));
                self.emit_jmp(lfalse.clone());
                Ok(())
            }
            Expr::BinOp {
                op: BinOp::And,
                left,
                right,
            } => {
                let lmid = self.fresh_label();
                self.lower_branch(left, &lmid, lfalse)?;
                self.emit_label(lmid);
                self.lower_branch(right, ltrue, lfalse)
            }
            Expr::BinOp {
                op: BinOp::Or,
                left,
                right,
            } => {
                let lmid = self.fresh_label();
                self.lower_branch(left, ltrue, &lmid)?;
                self.emit_label(lmid);
                self.lower_branch(right, ltrue, lfalse)
            }
            _ => {
                let t = self.lower_expr(expr)?;
                self.emit(Op::new(
                    Opcode::Jnz,
                    vec![Operand::Temp(t), Operand::Label(ltrue.clone())],
                    None,
                ));
                self.emit_jmp(lfalse.clone());
                Ok(())
            }
        }
    }
}

fn arithmetic_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::BitAnd => Opcode::And,
        BinOp::BitOr => Opcode::Or,
        BinOp::BitXor => Opcode::Xor,
        BinOp::Lshift => Opcode::Lshift,
        BinOp::Rshift => Opcode::Rshift,
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops never reach arithmetic lowering"),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            unreachable!("relational ops never reach arithmetic lowering")
        }
    }
}

/// `sub a, b -> d` then branch on `d`'s relation to zero.
fn relational_jump(op: BinOp) -> Opcode {
    match op {
        BinOp::Eq => Opcode::Jz,
        BinOp::Ne => Opcode::Jnz,
        BinOp::Lt => Opcode::Jl,
        BinOp::Le => Opcode::Jle,
        BinOp::Gt => Opcode::Jnle,
        BinOp::Ge => Opcode::Jnl,
        _ => unreachable!("only called for relational ops"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_ast::Type;
    use bx_core::Item;

    fn opcodes(listing: &TacListing) -> Vec<Opcode> {
        listing
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Op(op) => Some(op.opcode),
                Item::Label(_) => None,
            })
            .collect()
    }

    fn main_decl(body: Vec<Stmt>) -> FunctionDecl {
        FunctionDecl {
            name: "main".into(),
            params: vec![],
            return_type: Type::Int,
            body: Block(body),
        }
    }

    #[test]
    fn straight_line_assignment_and_print() {
        let decl = main_decl(vec![
            Stmt::Decl {
                name: "x".into(),
                ty: Type::Int,
                init: Expr::Int(0),
            },
            Stmt::Assign {
                name: "x".into(),
                expr: Expr::BinOp {
                    op: BinOp::Add,
                    left: Box::new(Expr::Var("x".into())),
                    right: Box::new(Expr::Int(1)),
                },
            },
            Stmt::Eval(Expr::Call {
                target: "print".into(),
                args: vec![Expr::Var("x".into())],
            }),
        ]);
        let listing = lower_function(&decl, &HashMap::new()).unwrap();
        assert_eq!(
            opcodes(&listing),
            vec![
                Opcode::Const,
                Opcode::Const,
                Opcode::Add,
                Opcode::Param,
                Opcode::Call,
                Opcode::Ret,
            ]
        );
        let text = listing.to_string();
        assert!(text.contains("%x = const 0"));
        assert!(text.contains("%x = add %x, "));
        assert!(text.contains("call @print, 2"));
    }

    #[test]
    fn empty_body_is_just_ret() {
        let decl = main_decl(vec![]);
        let listing = lower_function(&decl, &HashMap::new()).unwrap();
        assert_eq!(opcodes(&listing), vec![Opcode::Ret]);
    }

    #[test]
    fn if_else_emits_both_arms_and_a_join() {
        let decl = main_decl(vec![Stmt::If {
            cond: Expr::BinOp {
                op: BinOp::Lt,
                left: Box::new(Expr::Int(1)),
                right: Box::new(Expr::Int(2)),
            },
            then_branch: Block(vec![Stmt::Eval(Expr::Call {
                target: "print".into(),
                args: vec![Expr::Int(1)],
            })]),
            else_branch: Some(Block(vec![Stmt::Eval(Expr::Call {
                target: "print".into(),
                args: vec![Expr::Int(2)],
            })])),
        }]);
        let listing = lower_function(&decl, &HashMap::new()).unwrap();
        let labels: Vec<&Label> = listing
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Label(l) => Some(l),
                Item::Op(_) => None,
            })
            .collect();
        // entry + Lthen + Lelse + Ljoin
        assert_eq!(labels.len(), 4);
        assert!(opcodes(&listing).contains(&Opcode::Sub));
        assert!(opcodes(&listing).contains(&Opcode::Jl));
    }

    #[test]
    fn while_loop_threads_break_and_continue_to_the_right_labels() {
        let decl = main_decl(vec![Stmt::While {
            cond: Expr::Bool(true),
            body: Block(vec![Stmt::If {
                cond: Expr::Bool(false),
                then_branch: Block(vec![Stmt::Break]),
                else_branch: Some(Block(vec![Stmt::Continue])),
            }]),
        }]);
        let listing = lower_function(&decl, &HashMap::new()).unwrap();
        // Two jmp-to-label ops from break/continue, plus the loop's own
        // back edge and the branch-lowering jumps.
        assert!(opcodes(&listing).iter().filter(|op| **op == Opcode::Jmp).count() >= 3);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let decl = main_decl(vec![Stmt::Break]);
        let err = lower_function(&decl, &HashMap::new()).unwrap_err();
        assert_eq!(err, LowerError::LoopMisplaced);
    }

    #[test]
    fn unbound_name_is_rejected() {
        let decl = main_decl(vec![Stmt::Eval(Expr::Var("nope".into()))]);
        let err = lower_function(&decl, &HashMap::new()).unwrap_err();
        assert_eq!(err, LowerError::UnboundName("nope".into()));
    }

    #[test]
    fn global_read_and_write_go_through_copy() {
        let globals = global_map(&[GlobalDecl {
            name: "g".into(),
            ty: Type::Int,
            init: 0,
        }]);
        let decl = main_decl(vec![Stmt::Assign {
            name: "g".into(),
            expr: Expr::Int(9),
        }]);
        let listing = lower_function(&decl, &globals).unwrap();
        let text = listing.to_string();
        assert!(text.contains("@g = copy"));
    }

    #[test]
    fn short_circuit_and_does_not_evaluate_rhs_eagerly() {
        let decl = main_decl(vec![Stmt::Decl {
            name: "b".into(),
            ty: Type::Bool,
            init: Expr::BinOp {
                op: BinOp::And,
                left: Box::new(Expr::Bool(false)),
                right: Box::new(Expr::Bool(true)),
            },
        }]);
        let listing = lower_function(&decl, &HashMap::new()).unwrap();
        // materialize_condition's scaffolding plus the && intermediate
        // label means at least two conditional/unconditional jumps.
        assert!(opcodes(&listing).iter().any(|op| op.is_jump()));
    }

    #[test]
    fn boolean_negation_of_a_comparison_flips_branch_polarity() {
        let decl = main_decl(vec![Stmt::If {
            cond: Expr::UnOp {
                op: UnOp::BoolNot,
                expr: Box::new(Expr::BinOp {
                    op: BinOp::Eq,
                    left: Box::new(Expr::Int(1)),
                    right: Box::new(Expr::Int(1)),
                }),
            },
            then_branch: Block(vec![]),
            else_branch: None,
        }]);
        let listing = lower_function(&decl, &HashMap::new()).unwrap();
        // `!(1 == 1)` as a branch condition becomes a single `sub` +
        // `jz`, not a materialized bool followed by a `jnz` test.
        assert_eq!(
            opcodes(&listing)
                .into_iter()
                .filter(|op| *op == Opcode::Jz)
                .count(),
            1
        );
    }
}
