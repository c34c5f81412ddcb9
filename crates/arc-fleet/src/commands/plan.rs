//! Plan and outputs commands: build the graph without touching a cluster.

use anyhow::Result;
use arc_fleet::orchestrator;
use arc_fleet::ui::{self, Tone};
use clap::{Args, ValueEnum};

use super::GraphArgs;

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum PlanFormat {
    /// Human-readable list in apply order.
    #[default]
    Text,
    Yaml,
    Json,
}

/// Print the resource graph in dependency order.
#[derive(Args)]
pub struct PlanCommand {
    #[command(flatten)]
    graph: GraphArgs,

    #[arg(long, value_enum, default_value_t = PlanFormat::Text)]
    format: PlanFormat,
}

impl PlanCommand {
    pub fn run(&self) -> Result<()> {
        let graph = self.graph.build()?;
        let ordered = graph.topological_order();

        match self.format {
            PlanFormat::Text => {
                ui::heading("Resource plan");
                ui::print_plan(&graph);
                println!();
                ui::status(Tone::Done, &format!("{} resources planned", ordered.len()));
            }
            PlanFormat::Yaml => print!("{}", serde_yaml::to_string(&ordered)?),
            PlanFormat::Json => println!("{}", serde_json::to_string_pretty(&ordered)?),
        }
        Ok(())
    }
}

/// Print the outputs the graph publishes, without submitting it.
#[derive(Args)]
pub struct OutputsCommand {
    #[command(flatten)]
    graph: GraphArgs,
}

impl OutputsCommand {
    pub fn run(&self) -> Result<()> {
        let graph = self.graph.build()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&orchestrator::outputs(&graph))?
        );
        Ok(())
    }
}
