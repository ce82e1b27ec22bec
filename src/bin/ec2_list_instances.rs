use anyhow::{Context, Result};
use clap::Parser;

use exoctk_aws::aws::ec2::Ec2Client;

#[derive(Parser, Debug)]
#[command(name = "ec2_list_instances", about = "List EC2 instances in a region")]
struct Args {
    /// Region to list; defaults to the configured AWS region
    #[arg(long)]
    region: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let client = Ec2Client::from_env(args.region.as_deref())?;
    let instances = client
        .describe_instances(&[])
        .context("Failed to list instances")?;

    // Build rows: State, Id, Type, Launched, Public DNS
    let rows: Vec<[String; 5]> = instances
        .iter()
        .map(|it| {
            let handle = it.handle();
            [
                handle.state.to_string(),
                handle.id.clone(),
                it.instance_type.clone().unwrap_or_default(),
                it.launch_time.clone().unwrap_or_else(|| "-".to_string()),
                handle
                    .address()
                    .map(str::to_string)
                    .unwrap_or_else(|_| "-".to_string()),
            ]
        })
        .collect();

    println!("Region: {}", client.region());
    print_table(&["State", "Id", "Type", "Launched", "Public DNS"], &rows);
    Ok(())
}

fn print_table(headers: &[&str; 5], rows: &[[String; 5]]) {
    let mut widths = [0usize; 5];
    for (i, h) in headers.iter().enumerate() {
        widths[i] = widths[i].max(h.chars().count());
    }
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    print_row(headers.iter().copied(), &widths);
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    print_row(separator.iter().map(String::as_str), &widths);
    for row in rows {
        print_row(row.iter().map(String::as_str), &widths);
    }
}

fn print_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, w)| format!("{:width$}", cell, width = *w))
        .collect();
    println!("{}", line.join("  ").trim_end());
}
