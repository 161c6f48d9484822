//! Wires the lowerer, CFG builder/optimizer, and SSA construction /
//! optimization / deconstruction crates into the stages `bxc` exposes,
//! independent of how the CLI front-end reads its input or prints its
//! output.

use std::fmt::Write as _;

use bx_ast::Program;
use bx_core::{Cfg, SsaCfg, TacListing, Temp};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// Which point in the pipeline to stop at and render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    /// The lowerer's raw, unoptimized three-address listing.
    Tac,
    /// The built-and-optimized control-flow graph.
    Cfg,
    /// SSA form immediately after construction, before optimization.
    Ssa,
    /// SSA form after copy propagation / phi simplification / null-choice
    /// elimination reach a fixpoint.
    SsaOptimized,
    /// The fully deconstructed TAC, ready for register allocation.
    Final,
}

/// Run-wide configuration, mirroring the shape of a codegen options
/// struct: one place callers set everything the pipeline's behavior
/// depends on, with sensible defaults for the common case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Restrict the run to a single function by name; `None` runs every
    /// function in the program.
    pub function: Option<String>,
    /// Whether the CFG optimizer runs before SSA construction. Disabling
    /// it is only useful for inspecting the builder's raw output.
    pub optimize_cfg: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            function: None,
            optimize_cfg: true,
        }
    }
}

/// Runs every selected function through the pipeline up to `stage` and
/// renders the result as text, one procedure listing after another.
pub fn render(program: &Program, stage: Stage, options: &PipelineOptions) -> Result<String, CliError> {
    let listings = bx_lower::lower_program(program)?;
    let selected: Vec<_> = match &options.function {
        Some(name) => {
            let found = listings.into_iter().find(|l| &l.name == name);
            vec![found.ok_or_else(|| CliError::UnknownFunction(name.clone()))?]
        }
        None => listings,
    };

    let mut out = String::new();
    for listing in &selected {
        let rendered = match stage {
            Stage::Tac => listing.to_string(),
            Stage::Cfg => print_cfg(&build_cfg(listing, options)?),
            Stage::Ssa => print_ssa(&bx_ssa::generator::construct(&build_cfg(listing, options)?)?),
            Stage::SsaOptimized => {
                let ssa = bx_ssa::generator::construct(&build_cfg(listing, options)?)?;
                print_ssa(&bx_ssa::optimizer::optimize(ssa))
            }
            Stage::Final => compile_function(listing, options)?.to_string(),
        };
        let _ = write!(out, "{rendered}");
    }
    Ok(out)
}

/// Runs one listing all the way through to deconstructed TAC.
pub fn compile_function(listing: &TacListing, options: &PipelineOptions) -> Result<TacListing, CliError> {
    let cfg = build_cfg(listing, options)?;
    let ssa = bx_ssa::generator::construct(&cfg)?;
    let optimized = bx_ssa::optimizer::optimize(ssa);
    let mut deconstructed = bx_ssa::deconstructor::deconstruct(&optimized);
    let mut rebuilt = bx_cfg::builder::build(&deconstructed)?;
    bx_cfg::liveness::analyze(&mut rebuilt);
    deconstructed = bx_cfg::serialize::to_listing(&rebuilt);
    Ok(deconstructed)
}

fn build_cfg(listing: &TacListing, options: &PipelineOptions) -> Result<Cfg<Temp>, CliError> {
    let cfg = bx_cfg::builder::build(listing)?;
    let mut cfg = if options.optimize_cfg {
        bx_cfg::optimize::optimize(cfg)
    } else {
        cfg
    };
    bx_cfg::liveness::analyze(&mut cfg);
    Ok(cfg)
}

fn print_cfg(cfg: &Cfg<Temp>) -> String {
    let mut out = format!("proc {}({}):\n", cfg.name, params_text(&cfg.params));
    for block in cfg.blocks() {
        let _ = write!(out, "{block}");
    }
    out
}

fn print_ssa(cfg: &SsaCfg) -> String {
    let mut out = format!("proc {}({}):\n", cfg.name, params_text(&cfg.params));
    for block in cfg.blocks() {
        let _ = write!(out, "{block}");
    }
    out
}

fn params_text(params: &[Temp]) -> String {
    params.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_ast::{Block, FunctionDecl, Param, Program, Stmt, Type};

    fn identity_program() -> Program {
        Program {
            globals: vec![],
            functions: vec![FunctionDecl {
                name: "identity".into(),
                params: vec![Param { name: "x".into(), ty: Type::Int }],
                return_type: Type::Int,
                body: Block(vec![Stmt::Eval(bx_ast::Expr::Var("x".into()))]),
            }],
        }
    }

    #[test]
    fn tac_stage_renders_the_raw_listing() {
        let program = identity_program();
        let options = PipelineOptions::default();
        let out = render(&program, Stage::Tac, &options).unwrap();
        assert!(out.contains("proc identity"));
    }

    #[test]
    fn unknown_function_is_reported() {
        let program = identity_program();
        let options = PipelineOptions {
            function: Some("nope".into()),
            ..PipelineOptions::default()
        };
        let err = render(&program, Stage::Tac, &options).unwrap_err();
        assert!(matches!(err, CliError::UnknownFunction(name) if name == "nope"));
    }

    #[test]
    fn final_stage_runs_the_whole_pipeline() {
        let program = identity_program();
        let options = PipelineOptions::default();
        let out = render(&program, Stage::Final, &options).unwrap();
        assert!(out.contains("ret"));
    }
}
