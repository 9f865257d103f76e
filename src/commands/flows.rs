use anyhow::{Result, bail};
use colored::Colorize;
use store::{ApplicationFlowRecord, StageRecord};

use crate::Context;
use crate::cli::FlowsCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: FlowsCommand) -> Result<()> {
    let store = super::open_store(ctx)?;

    match cmd {
        FlowsCommand::Show { id, stages } => {
            let Some(flow) = store.find_flow(&id, stages)? else {
                bail!(appgraph::Error::NotFound(format!("Flow not found: {id}")));
            };

            ui::header(&format!("Flow {}", flow.id));
            ui::kv("Tenant", &flow.tenant_id);
            ui::kv("Type", &flow.entitlement_type);
            ui::kv("Status", &ui::status(flow.status).to_string());
            ui::kv("Started", &ui::format_time(flow.started_at));
            ui::kv(
                "Duration",
                &ui::format_duration(flow.started_at, flow.finished_at),
            );

            if !flow.application_flows.is_empty() {
                ui::section("Applications");
                for app in &flow.application_flows {
                    show_application_flow(app);
                }
            }
        }
        FlowsCommand::List { tenant, app, limit } => {
            if let Some(app) = app {
                let flows = store.find_application_flows(&tenant, Some(&app))?;
                ui::header(&format!("Flows of {app} for {tenant}"));
                if flows.is_empty() {
                    ui::dim("No flows recorded");
                }
                for flow in flows.iter().rev().take(limit) {
                    show_application_flow(flow);
                }
                return Ok(());
            }

            let flows = store.find_flows_by_tenant(&tenant, limit)?;
            ui::header(&format!("Flows of {tenant}"));
            if flows.is_empty() {
                ui::dim("No flows recorded");
            }
            for flow in &flows {
                println!(
                    "  {} {:<8} {} {}",
                    ui::status_icon(flow.status),
                    flow.entitlement_type,
                    flow.id,
                    ui::format_time(flow.started_at).dimmed()
                );
            }
        }
        FlowsCommand::App { id, stages } => {
            let Some(flow) = store.find_application_flow(&id, stages)? else {
                bail!(appgraph::Error::NotFound(format!(
                    "Application flow not found: {id}"
                )));
            };

            ui::header(&format!("Application flow {}", flow.id));
            ui::kv("Flow", &flow.flow_id);
            ui::kv("Tenant", &flow.tenant_id);
            ui::kv("Application", &flow.application_id);
            ui::kv("Type", &flow.entitlement_type);
            ui::kv("Status", &ui::status(flow.status).to_string());
            ui::kv(
                "Duration",
                &ui::format_duration(flow.started_at, flow.finished_at),
            );
            if !flow.stages.is_empty() {
                ui::section("Stages");
                for stage in &flow.stages {
                    show_stage(stage);
                }
            }
        }
    }

    Ok(())
}

fn show_application_flow(flow: &ApplicationFlowRecord) {
    println!(
        "  {} {:<8} {} {} {}",
        ui::status_icon(flow.status),
        flow.entitlement_type,
        flow.application_id.bold(),
        flow.id.dimmed(),
        ui::format_duration(flow.started_at, flow.finished_at).dimmed()
    );
    for stage in &flow.stages {
        print!("    ");
        show_stage(stage);
    }
}

fn show_stage(stage: &StageRecord) {
    let detail = stage.detail.as_deref().unwrap_or_default();
    println!(
        "  {} {} {} {}",
        ui::status_icon(stage.status),
        stage.name,
        ui::format_duration(stage.started_at, stage.finished_at).dimmed(),
        detail.dimmed()
    );
}
