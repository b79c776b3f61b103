use tracing::{debug, info};

use unifi_provider_core::ReconcileError;

use crate::cli::{ApplyArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;
use crate::{resources, state_file};

pub async fn handle(args: ApplyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let specs = resources::load(&args.resources.file)?;
    let mut store = state_file::load(&args.state.state)?;

    let reconciler = super::connect(global).await?;
    let cancel = super::cancel_on_interrupt();
    let plan = reconciler.plan(&store, specs, &cancel).await?;

    let color = output::should_color(&global.color);
    if matches!(global.output, OutputFormat::Table) {
        output::print_output(
            &output::render_plan(&global.output, &plan.changes, color),
            global.quiet,
        );
    }

    // No-op instances still run so their refreshed state is committed.
    let report = reconciler.apply(&plan, &cancel).await;
    report.commit(&mut store);
    state_file::save(&args.state.state, &store)?;
    info!(run_id = %report.run_id, serial = store.serial, "state committed");

    if plan.changes.has_changes() || !matches!(global.output, OutputFormat::Table) {
        output::print_output(
            &output::render_report(&global.output, &report, color),
            global.quiet,
        );
    }

    if let Err(e) = reconciler.controller().disconnect().await {
        debug!(error = %e, "logout failed");
    }

    if report.is_success() {
        return Ok(());
    }
    let fatal = report
        .failed()
        .filter_map(|r| r.error())
        .find(|e| e.is_fatal());
    match fatal {
        Some(ReconcileError::Auth { message }) => Err(CliError::AuthFailed {
            message: message.clone(),
        }),
        _ => Err(CliError::ApplyFailed {
            failed: report.failed().count(),
            total: report.instances.len(),
        }),
    }
}
