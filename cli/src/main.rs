mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;

use clap::Parser;
use std::error;
use std::io::{self, Write};

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let client = ClientCli::new(&args.server);

    match args.sub_command {
        SubCommand::Exec {
            image,
            input,
            output,
            inline,
            command,
        } => {
            let response = client
                .exec(&image, &command, input.as_deref(), inline)
                .await?;
            io::stdout().write_all(response.stdout.as_bytes())?;
            if let Some(dir) = output {
                client_cli::unpack_result(&response, &dir)?;
                eprintln!("workspace extracted to {}", dir.display());
            }
        }
        SubCommand::Cpu => print!("{}", client.get_text(protocol::CPU_ROUTE).await?),
        SubCommand::Memory => print!("{}", client.get_text(protocol::MEMORY_ROUTE).await?),
        SubCommand::Load => print!("{}", client.get_text(protocol::LOAD_ROUTE).await?),
        SubCommand::Health => println!("{}", client.get_text(protocol::HEALTH_ROUTE).await?),
        SubCommand::Jobs => {
            for job in client.list_jobs().await? {
                println!("{}\t{}", job.job_id, job.state);
            }
        }
    }

    Ok(())
}
