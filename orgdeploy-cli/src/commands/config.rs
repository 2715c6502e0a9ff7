use crate::cli::OutputFormat;
use clap::Args;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output format (`table` prints YAML)
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

pub async fn execute(args: ConfigArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.load_options()?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&options)?),
        OutputFormat::Yaml | OutputFormat::Table => print!("{}", options.to_yaml()?),
    }
    Ok(())
}
