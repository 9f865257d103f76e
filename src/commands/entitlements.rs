use anyhow::{Result, bail};
use appgraph::{ApplicationStateTransitionPlan, EntitlementType};
use colored::Colorize;
use dialoguer::Confirm;
use flowkit::{ExecutionStatus, FlowReport};

use crate::Context;
use crate::cli::{ChangeArgs, PlanArgs, SyncArgs, ValidateArgs};
use crate::engine::{ApplicationFlowRef, EntitlementRequest, EntitlementService};
use crate::ui;

// ============================================================================
// Entitle / Revoke / Upgrade
// ============================================================================

pub fn entitle(ctx: &Context, args: ChangeArgs) -> Result<()> {
    change(ctx, EntitlementType::Entitle, args)
}

pub fn revoke(ctx: &Context, args: ChangeArgs) -> Result<()> {
    change(ctx, EntitlementType::Revoke, args)
}

pub fn upgrade(ctx: &Context, args: ChangeArgs) -> Result<()> {
    change(ctx, EntitlementType::Upgrade, args)
}

fn change(ctx: &Context, entitlement_type: EntitlementType, args: ChangeArgs) -> Result<()> {
    let request = EntitlementRequest::new(args.tenant, entitlement_type, args.applications)
        .ignore_errors(args.ignore_errors)
        .purge(args.purge)
        .run_async(args.run_async);

    let service = super::open_service(ctx)?;
    if !ctx.quiet {
        ui::header(&format!("{} {}", title(entitlement_type), request.tenant_id));
    }
    run(ctx, &service, &request)
}

fn title(entitlement_type: EntitlementType) -> &'static str {
    match entitlement_type {
        EntitlementType::Entitle => "Entitle",
        EntitlementType::Revoke => "Revoke",
        EntitlementType::Upgrade => "Upgrade",
        EntitlementType::State => "Sync",
    }
}

/// Run a request and report the outcome
///
/// Async requests print the flow id as soon as the flow is submitted so it
/// can be followed with `flows show` while this process waits for it.
fn run(ctx: &Context, service: &EntitlementService, request: &EntitlementRequest) -> Result<()> {
    let (application_flows, report) = if request.run_async {
        let submission = service.submit(request)?;
        println!("{} {}", "Flow submitted:".bold(), submission.handle.flow_id());
        let report = submission.handle.wait()?;
        (submission.application_flows, report)
    } else {
        let run = service.execute(request)?;
        (run.application_flows, run.report)
    };

    if !ctx.quiet {
        show_application_flows(&application_flows);
    }
    summarize(ctx, &report)
}

fn show_application_flows(flows: &[ApplicationFlowRef]) {
    if flows.is_empty() {
        return;
    }
    ui::section("Applications");
    for flow in flows {
        let note = if flow.skipped { " (skipped)".dimmed().to_string() } else { String::new() };
        println!(
            "  {:<8} {} {}{}",
            flow.entitlement_type.as_str(),
            flow.application_id.bold(),
            flow.flow_id.dimmed(),
            note
        );
    }
}

fn summarize(ctx: &Context, report: &FlowReport) -> Result<()> {
    println!();
    if report.is_success() {
        ui::success(&format!("Flow {} {}", report.flow_id, ui::status(report.status)));
        if ctx.verbose > 0 {
            for stage in &report.stages {
                ui::dim(&format!("  {} {}", stage.stage_id, stage.detail));
            }
        }
        return Ok(());
    }

    ui::section("Stages");
    for stage in report
        .stages
        .iter()
        .filter(|s| s.status != ExecutionStatus::Finished)
    {
        println!(
            "  {} {} {}",
            ui::status_icon(stage.status),
            stage.stage_id,
            stage.detail.dimmed()
        );
    }
    println!();
    bail!("Flow {} finished with status {}", report.flow_id, report.status)
}

// ============================================================================
// Desired state
// ============================================================================

pub fn sync(ctx: &Context, args: SyncArgs) -> Result<()> {
    let service = super::open_service(ctx)?;
    let plan = service.plan(&args.tenant, &args.applications)?;

    ui::header(&format!("Sync {}", args.tenant));
    show_plan(&plan);
    if plan.is_empty() {
        ui::success("Tenant already matches the desired applications");
        return Ok(());
    }

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    if !args.yes {
        println!();
        let confirmed = Confirm::new()
            .with_prompt("Continue?")
            .default(true)
            .interact()?;
        if !confirmed {
            ui::warn("Aborted");
            return Ok(());
        }
    }

    let request = EntitlementRequest::new(args.tenant, EntitlementType::State, args.applications)
        .ignore_errors(args.ignore_errors)
        .purge(args.purge);
    run(ctx, &service, &request)
}

pub fn plan(ctx: &Context, args: PlanArgs) -> Result<()> {
    let service = super::open_service(ctx)?;
    let plan = service.plan(&args.tenant, &args.applications)?;

    ui::header(&format!("Plan for {}", args.tenant));
    show_plan(&plan);
    if plan.is_empty() {
        ui::success("Nothing to change");
    }
    Ok(())
}

fn show_plan(plan: &ApplicationStateTransitionPlan) {
    for id in plan.entitle_ids() {
        println!("  {} {}", "+".green(), id);
    }
    for (to, from) in plan.upgrade_pairs() {
        println!("  {} {} {}", "~".yellow(), to, format!("(from {from})").dimmed());
    }
    for id in plan.revoke_ids() {
        println!("  {} {}", "-".red(), id);
    }
    if !plan.is_empty() {
        println!();
        ui::kv("Changes", &plan.len().to_string());
    }
}

// ============================================================================
// Validation
// ============================================================================

pub fn validate(ctx: &Context, args: ValidateArgs) -> Result<()> {
    let Some(entitlement_type) = EntitlementType::parse(&args.entitlement_type) else {
        bail!(appgraph::Error::validation(format!(
            "Invalid entitlement type: {}",
            args.entitlement_type
        )));
    };

    let service = super::open_service(ctx)?;
    let request = EntitlementRequest::new(args.tenant, entitlement_type, args.applications);
    service.validate(&request, &args.validator)?;

    if !ctx.quiet {
        ui::success(&format!("{} validation passed", args.validator));
    }
    Ok(())
}

// ============================================================================
// Tenant entitlements
// ============================================================================

pub fn list(ctx: &Context, tenant: &str) -> Result<()> {
    let store = super::open_store(ctx)?;
    let entitlements = store.find_by_tenant_id(tenant)?;

    ui::header(&format!("Entitlements of {tenant}"));
    if entitlements.is_empty() {
        ui::dim("No applications entitled");
        return Ok(());
    }
    for entitlement in &entitlements {
        println!(
            "  {} {}",
            entitlement.application_id.bold(),
            ui::format_time(Some(entitlement.created_at)).dimmed()
        );
    }
    println!();
    ui::kv("Total", &entitlements.len().to_string());
    Ok(())
}
