use crate::cli::OutputFormat;
use clap::Args;
use comfy_table::{Table, presets};
use orgdeploy::{ExecutionContext, HostRunner, Verifier, VerifyReport};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub async fn execute(args: CheckArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.load_options()?;
    let runner = HostRunner::new();
    let ctx = ExecutionContext::current();

    let report = Verifier::new(&options, &runner, &ctx).run().await;
    print_report(&report, args.format)?;

    report.into_result()?;
    Ok(())
}

fn print_report(report: &VerifyReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(presets::NOTHING);
            table.set_header(vec!["CHECK", "STATUS", "DETAIL"]);
            for check in &report.checks {
                let status = if check.ok { "ok" } else { "FAILED" };
                table.add_row(vec![check.name, status, check.detail.as_str()]);
            }
            println!("{table}");
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(report)?),
    }
    Ok(())
}
