//! Command execution.

use crate::config::Config;
use crate::Commands;
use colored::{ColoredString, Colorize};
use flowstead_core::condition::lookup;
use flowstead_core::{
    validate_graph, ActionLog, ActionStatus, Condition, Context, EntityRef, InstanceStatus,
    Operator, StartRequest, TransitionRecord, ValidationReport, WorkflowEngine, WorkflowGraph,
    WorkflowInstance,
};
use flowstead_storage::{validate_tenant_id, TenantStores, WalStore};
use flowstead_wal::{repair_wal, verify_wal};
use serde_json::Value;
use std::sync::Arc;

type Engine = WorkflowEngine<Arc<WalStore>>;

/// Executes a command and returns the formatted output.
pub fn execute(
    config: &Config,
    tenant: &str,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Validate { graph } => {
            let graph = parse_graph_arg(&graph)?;
            let report = validate_graph(&graph);
            if !report.is_valid() {
                return Err(format_report(&report).into());
            }
            Ok(format_report(&report))
        }

        Commands::Start {
            workflow,
            graph,
            ctx,
            entity,
        } => {
            let graph = parse_graph_arg(&graph)?;
            let mut request = StartRequest::new(tenant, workflow, graph);
            if let Some(ctx) = ctx {
                request = request.with_context(parse_context_arg(&ctx)?);
            }
            if let Some(entity) = entity {
                let entity = EntityRef::parse(&entity)
                    .ok_or_else(|| format!("entity must be type:id, got '{}'", entity))?;
                request = request.with_entity(entity);
            }

            let inst = open_engine(config, tenant)?.start(request)?;
            Ok(format!(
                "{} instance {} ({} at {})",
                "Started".green(),
                inst.id.cyan(),
                inst.workflow_name,
                inst.current_node_id.yellow()
            ))
        }

        Commands::Advance { id, to, label } => {
            let engine = open_engine(config, tenant)?;
            let before = engine.get(&id)?;
            let inst = engine.advance(&id, to.as_deref(), label.as_deref())?;

            if before.status != InstanceStatus::Running {
                Ok(format!(
                    "{} instance {} is {}",
                    "Unchanged".yellow(),
                    id.cyan(),
                    status_colored(inst.status)
                ))
            } else if before.current_node_id == inst.current_node_id {
                Ok(format!(
                    "{} {} at {} ({})",
                    "Advanced".green(),
                    id.cyan(),
                    inst.current_node_id.yellow(),
                    status_colored(inst.status)
                ))
            } else {
                Ok(format!(
                    "{} {}: {} -> {} ({})",
                    "Advanced".green(),
                    id.cyan(),
                    before.current_node_id,
                    inst.current_node_id.yellow(),
                    status_colored(inst.status)
                ))
            }
        }

        Commands::Context { id, patch } => {
            let inst =
                open_engine(config, tenant)?.update_context(&id, parse_context_arg(&patch)?)?;
            Ok(format_instance(&inst))
        }

        Commands::Show { id } => Ok(format_instance(&open_engine(config, tenant)?.get(&id)?)),

        Commands::History { id } => {
            let records = open_engine(config, tenant)?.history(&id)?;
            if records.is_empty() {
                return Ok("No transitions recorded".yellow().to_string());
            }
            Ok(records
                .iter()
                .map(format_transition)
                .collect::<Vec<_>>()
                .join("\n"))
        }

        Commands::Actions { id } => {
            let logs = open_engine(config, tenant)?.action_logs(&id)?;
            if logs.is_empty() {
                return Ok("No actions executed".yellow().to_string());
            }
            Ok(logs.iter().map(format_action).collect::<Vec<_>>().join("\n"))
        }

        Commands::List => {
            let instances = open_engine(config, tenant)?.list(Some(tenant))?;
            if instances.is_empty() {
                return Ok(format!("No instances for tenant {}", tenant).yellow().to_string());
            }

            let mut output = format!("{}\n", format!("Instances ({}):", instances.len()).bold());
            for inst in &instances {
                output.push_str(&format!(
                    "  {} {} {} @ {}\n",
                    inst.id.cyan(),
                    status_colored(inst.status),
                    inst.workflow_name,
                    inst.current_node_id.yellow()
                ));
            }
            Ok(output.trim_end().to_string())
        }

        Commands::Pause { id } => {
            let inst = open_engine(config, tenant)?.pause(&id)?;
            Ok(format!("{} {}", "Paused".yellow(), inst.id.cyan()))
        }

        Commands::Resume { id } => {
            let inst = open_engine(config, tenant)?.resume(&id)?;
            Ok(format!("{} {}", "Resumed".green(), inst.id.cyan()))
        }

        Commands::Delete { id } => {
            open_engine(config, tenant)?.delete(&id)?;
            Ok(format!("{} instance {}", "Deleted".green(), id.cyan()))
        }

        Commands::Eval {
            variable,
            operator,
            value,
            ctx,
        } => {
            let context = parse_context_arg(&ctx)?;
            let condition = Condition::new(variable, operator, value);
            let result = condition.evaluate(&context);

            let mut output = String::new();
            if Operator::parse(&condition.operator).is_none() {
                output.push_str(&format!(
                    "{}: unknown operator '{}', compared with ==\n",
                    "Warning".yellow(),
                    condition.operator
                ));
            }
            let actual = match lookup(&context, &condition.variable) {
                Some(v) => format!("{} = {}", condition.variable, v),
                None => format!("{} is not set", condition.variable),
            };
            let verdict = if result { "true".green() } else { "false".red() };
            output.push_str(&format!("{} ({}; {})", verdict, condition, actual.dimmed()));
            Ok(output)
        }

        Commands::Tenants => {
            let tenants = tenant_stores(config).tenants()?;
            if tenants.is_empty() {
                return Ok("No tenants".yellow().to_string());
            }
            Ok(tenants.join("\n"))
        }

        Commands::Check { repair } => {
            validate_tenant_id(tenant)?;
            let wal = tenant_stores(config).wal_config(tenant);
            let report = if repair {
                repair_wal(&wal.dir, wal.segment_size)?
            } else {
                verify_wal(&wal.dir, wal.segment_size)?
            };

            let mut output = format!(
                "{}\n  records:       {}\n  max sequence:  {}\n  trailing:      {} bytes",
                format!("WAL {}", wal.dir.display()).bold(),
                report.valid_records,
                report.max_sequence,
                report.trailing_bytes
            );
            if report.is_clean() {
                output.push_str(&format!("\n{}", "Clean".green()));
            } else {
                for damage in &report.damaged_segments {
                    output.push_str(&format!(
                        "\n  segment {} at byte {}: {}",
                        damage.segment,
                        damage.valid_end,
                        damage.reason.red()
                    ));
                }
                let verdict = if repair {
                    "Repaired".green()
                } else {
                    "Damaged (run with --repair to truncate)".red()
                };
                output.push_str(&format!("\n{}", verdict));
            }
            Ok(output)
        }

        Commands::Compact => {
            let report = tenant_stores(config).store(tenant)?.compact()?;
            Ok(format!(
                "{} tenant {}: {} instance(s), {} segment(s) removed, {} -> {} bytes",
                "Compacted".green(),
                tenant.cyan(),
                report.instances,
                report.segments_removed,
                report.bytes_before,
                report.bytes_after
            ))
        }
    }
}

fn tenant_stores(config: &Config) -> TenantStores {
    TenantStores::new(
        config.storage.data_dir.clone(),
        config.storage.wal_segment_size(),
        config.storage.fsync_policy.into(),
    )
    .with_compact_every(config.storage.compact_every)
}

fn open_engine(config: &Config, tenant: &str) -> Result<Engine, Box<dyn std::error::Error>> {
    let store = tenant_stores(config).store(tenant)?;
    Ok(WorkflowEngine::with_config(store, config.engine))
}

/// Parses a JSON argument (or @file.json to read from file).
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

fn parse_context_arg(arg: &str) -> Result<Context, Box<dyn std::error::Error>> {
    match parse_json_arg(arg)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("context must be a JSON object, got {}", other).into()),
    }
}

/// Parses a graph argument: inline JSON, @file.json, or @file.yaml.
fn parse_graph_arg(arg: &str) -> Result<WorkflowGraph, Box<dyn std::error::Error>> {
    match arg.strip_prefix('@') {
        Some(path) if path.ends_with(".yaml") || path.ends_with(".yml") => {
            let content = std::fs::read_to_string(path)?;
            Ok(WorkflowGraph::from_yaml_str(&content)?)
        }
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(WorkflowGraph::from_json_str(&content)?)
        }
        None => Ok(WorkflowGraph::from_json_str(arg)?),
    }
}

fn status_colored(status: InstanceStatus) -> ColoredString {
    match status {
        InstanceStatus::Running => status.as_str().green(),
        InstanceStatus::Completed => status.as_str().blue(),
        InstanceStatus::Failed => status.as_str().red(),
        InstanceStatus::Paused => status.as_str().yellow(),
    }
}

fn format_timestamp(millis: i64) -> String {
    use chrono::TimeZone;
    chrono::Utc
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn format_report(report: &ValidationReport) -> String {
    let mut output = String::new();
    for error in &report.errors {
        output.push_str(&format!("{}: {}\n", "error".red(), error));
    }
    for warning in &report.warnings {
        output.push_str(&format!("{}: {}\n", "warning".yellow(), warning));
    }
    if report.is_valid() {
        output.push_str(&format!(
            "{} ({} warning(s))",
            "Graph is valid".green(),
            report.warnings.len()
        ));
    } else {
        output.push_str(&format!(
            "{} ({} error(s))",
            "Graph is invalid".red(),
            report.errors.len()
        ));
    }
    output
}

fn format_instance(inst: &WorkflowInstance) -> String {
    let node_label = inst
        .current_node()
        .map(|n| n.label.as_str())
        .filter(|l| !l.is_empty())
        .map(|l| format!(" ({})", l))
        .unwrap_or_default();

    let mut output = format!(
        "{}\n  tenant:    {}\n  workflow:  {}\n  status:    {}\n  node:      {}{}\n",
        format!("Instance {}", inst.id).bold(),
        inst.tenant_id,
        inst.workflow_name,
        status_colored(inst.status),
        inst.current_node_id.yellow(),
        node_label
    );
    if let Some(entity) = &inst.entity {
        output.push_str(&format!("  entity:    {}\n", entity));
    }
    output.push_str(&format!("  created:   {}\n", format_timestamp(inst.created_at)));
    output.push_str(&format!("  updated:   {}\n", format_timestamp(inst.updated_at)));
    if let Some(done) = inst.completed_at {
        output.push_str(&format!("  completed: {}\n", format_timestamp(done)));
    }
    output.push_str(&format!(
        "  context:\n{}",
        format_json(&Value::Object(inst.context.clone()))
    ));
    output
}

fn format_transition(record: &TransitionRecord) -> String {
    let mut line = format!(
        "{} #{} {} -> {}",
        format_timestamp(record.created_at).dimmed(),
        record.sequence,
        record.from_node_id,
        record.to_node_id.yellow()
    );
    if let Some(label) = &record.edge_label {
        line.push_str(&format!(" [{}]", label.cyan()));
    }
    if let Some(cond) = &record.condition_evaluated {
        line.push_str(&format!(
            " if {} {} {} => {}",
            cond.variable, cond.operator, cond.value, cond.result
        ));
    }
    if let Some(action) = &record.action_executed {
        line.push_str(&format!(" action {}", action.action_type));
    }
    line
}

fn format_action(log: &ActionLog) -> String {
    let status = match log.status {
        ActionStatus::Success => "success".green(),
        ActionStatus::Failed => "failed".red(),
    };
    let mut line = format!(
        "{} #{} {} {} {}",
        format_timestamp(log.created_at).dimmed(),
        log.sequence,
        log.node_id,
        log.action_type.as_str().cyan(),
        status
    );
    if let Some(msg) = &log.error_message {
        line.push_str(&format!(": {}", msg));
    }
    line
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
