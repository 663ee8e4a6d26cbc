use anyhow::{anyhow, Context, Result};
use descriptor_orm::{
    cli::{Cli, Commands},
    database::{FileStorage, OrmContext},
    parser::{load_application, DirectorySource},
    query::{SqliteQueryBuilder, SqliteTypeHandler},
    schema::{creation_order, ApplicationDescriptor},
    writer::{generate_create_table, generate_indexes, table_columns},
};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "descriptor_orm=info",
        1 => "descriptor_orm=debug",
        _ => "descriptor_orm=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(cli: &Cli) -> Result<ApplicationDescriptor> {
    let source = DirectorySource::new(&cli.descriptors);
    load_application(&source, &cli.application).with_context(|| {
        format!(
            "Failed to load descriptors from {}",
            cli.descriptors.join(&cli.application).display()
        )
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let application = load(&cli)?;

    match cli.command {
        Commands::Deploy {
            data_dir,
            external_dir,
        } => {
            let start = Instant::now();

            let data_dir = data_dir
                .or_else(FileStorage::default_data_dir)
                .ok_or_else(|| anyhow!("No data directory available, pass --data-dir"))?;
            let mut storage = FileStorage::new(&data_dir);
            if let Some(external_dir) = external_dir {
                storage = storage.with_external_dir(external_dir);
            }

            let context = OrmContext::new(application, Arc::new(storage))
                .context("Failed to configure databases")?;
            context
                .ensure_all_ready()
                .context("Failed to deploy databases")?;

            for database in context.application().databases() {
                println!(
                    "  {} (version {}, {} entities): {}",
                    database.database_name,
                    database.version,
                    database.entity_count(),
                    context.state(&database.database_name)?
                );
            }
            context.shutdown().context("Failed to close databases")?;

            println!(
                "\nDeployed {} database(s) to {:?} in {:.1}s",
                context.application().databases().len(),
                data_dir,
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Ddl { database } => {
            let builder = SqliteQueryBuilder;
            let types = SqliteTypeHandler;

            for descriptor in application.databases() {
                if database
                    .as_deref()
                    .is_some_and(|name| name != descriptor.database_name)
                {
                    continue;
                }

                println!("-- {}", descriptor.file_name());
                for index in creation_order(descriptor)? {
                    let Some(entity) = descriptor.entity_at(index) else {
                        continue;
                    };
                    let sql = generate_create_table(descriptor, entity, &builder, &types)
                        .with_context(|| format!("Failed to generate {}", entity.table_name))?;
                    println!("{};", sql);
                    for sql in generate_indexes(entity, &builder)? {
                        println!("{};", sql);
                    }
                }
            }
        }

        Commands::ListEntities => {
            for database in application.databases() {
                println!("{}:", database.database_name);
                for entity in database.entities() {
                    let columns: Vec<String> = table_columns(database, entity)?
                        .into_iter()
                        .map(|column| column.attribute.column_name)
                        .collect();
                    println!(
                        "  {} -> {} ({})",
                        entity.class_name,
                        entity.table_name,
                        columns.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}
