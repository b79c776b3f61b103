use unifi_provider_core::StateRecord;

use crate::cli::{GlobalOpts, RefreshArgs};
use crate::error::CliError;
use crate::output;
use crate::{resources, state_file};

pub async fn handle(args: RefreshArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let specs = match &args.file {
        Some(path) => resources::load(path)?,
        None => Vec::new(),
    };
    let mut store = state_file::load(&args.state.state)?;

    let reconciler = super::connect(global).await?;
    let cancel = super::cancel_on_interrupt();
    let live = reconciler.refresh(&store, &specs, &cancel).await?;

    store.apply_refresh(&live);
    state_file::save(&args.state.state, &store)?;

    let records: Vec<StateRecord> = store.records().cloned().collect();
    output::print_output(
        &output::render_records(&global.output, &records),
        global.quiet,
    );
    Ok(())
}
