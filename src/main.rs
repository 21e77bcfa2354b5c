use std::env;

use anyhow::{Context, Result};
use sos_cidadao::geolocation::FixedPosition;
use sos_cidadao::postal_code::{self, InputKind};
use sos_cidadao::{
    AliasTable, AssistantClient, ChatSession, CityContacts, Config, ContactDirectory, Coordinates,
    GeolocationService, LookupError, NominatimClient, SmartLookup, ViaCepClient,
    emergency_numbers,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn usage(program: &str) {
    eprintln!("Usage: {} <command> [args]", program);
    eprintln!("  search <cep | city | \"city, UF\">   resolve a location and list its contacts");
    eprintln!("  contacts <cep>                     list the contacts for a postal code");
    eprintln!("  locate <latitude> <longitude>      reverse-geocode coordinates");
    eprintln!("  emergency                          list nationwide emergency numbers");
    eprintln!("  chat <message> [cep]               ask the assistant");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sos_cidadao=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        std::process::exit(1);
    }

    let config = Config::from_env();
    let directory = config
        .load_directory()
        .context("Failed to load contact directory")?;
    let aliases = AliasTable::default();

    match args[1].as_str() {
        "search" => {
            let query = args[2..].join(" ");
            search(&config, &directory, &aliases, &query).await
        }
        "contacts" => {
            let Some(raw) = args.get(2) else {
                usage(&args[0]);
                std::process::exit(1);
            };
            match directory.lookup(raw) {
                Some(contacts) => print_contacts(&contacts),
                None => eprintln!("{}", LookupError::InvalidInput(raw.clone()).user_message()),
            }
            Ok(())
        }
        "locate" => {
            let coordinates = args
                .get(2)
                .zip(args.get(3))
                .and_then(|(lat, lon)| Coordinates::new(lat.parse().ok()?, lon.parse().ok()?));
            let Some(coordinates) = coordinates else {
                eprintln!("Error: latitude and longitude must be valid decimal degrees");
                std::process::exit(1);
            };
            locate(&config, &directory, &aliases, coordinates).await
        }
        "emergency" => {
            for entry in emergency_numbers() {
                println!("{:>4}  {}", entry.number, entry.label);
            }
            Ok(())
        }
        "chat" => {
            let Some(message) = args.get(2) else {
                usage(&args[0]);
                std::process::exit(1);
            };
            let cep = args.get(3).and_then(|c| postal_code::normalize(c));
            let client = AssistantClient::new(&config.assistant_url, config.http_timeout)?;
            let mut session = ChatSession::open(cep, None);
            let reply = session.ask(&client, message).await;
            println!("{}", reply.content);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            usage(&args[0]);
            std::process::exit(1);
        }
    }
}

async fn search(
    config: &Config,
    directory: &ContactDirectory,
    aliases: &AliasTable,
    query: &str,
) -> Result<()> {
    let resolver = ViaCepClient::new(&config.viacep_base_url, config.http_timeout)?;
    let lookup = SmartLookup::new(&resolver, aliases);

    match lookup.resolve(query).await {
        Ok(address) => {
            println!("Endereço: {}", address);
            println!("CEP: {}", postal_code::format_display(&address.postal_code));
            if let Some(contacts) = directory.lookup(&address.postal_code) {
                print_contacts(&contacts);
            }
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            // A well-formed postal code still maps to regional contacts offline
            if postal_code::detect_input_type(query) == InputKind::PostalCode
                && let Some(contacts) = directory.lookup(query)
            {
                print_contacts(&contacts);
            }
        }
    }
    Ok(())
}

async fn locate(
    config: &Config,
    directory: &ContactDirectory,
    aliases: &AliasTable,
    coordinates: Coordinates,
) -> Result<()> {
    let provider = FixedPosition(coordinates);
    let geocoder = NominatimClient::new(
        &config.nominatim_base_url,
        &config.nominatim_user_agent,
        config.http_timeout,
    )?;

    let result = match GeolocationService::new(&provider, &geocoder, aliases)
        .locate()
        .await
    {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(line) = &result.address_line {
        println!("Endereço: {}", line);
    }
    match (&result.city, &result.state) {
        (Some(city), Some(state)) => println!("Cidade: {}/{}", city, state),
        (Some(city), None) => println!("Cidade: {}", city),
        _ => {}
    }
    if let Some(cep) = result.postal_code.as_deref()
        && let Some(contacts) = directory.lookup(cep)
    {
        println!("CEP: {}", postal_code::format_display(cep));
        print_contacts(&contacts);
    }
    Ok(())
}

fn print_contacts(contacts: &CityContacts) {
    if contacts.state.is_empty() {
        println!("\n{}", contacts.city);
    } else {
        println!("\n{}/{}", contacts.city, contacts.state);
    }
    for (kind, service) in contacts.services() {
        println!("\n  {} - {}", kind, service.organization);
        for phone in &service.phones {
            println!("    {:<14} {:<20} {}", phone.label, phone.number, phone.link());
        }
        if let Some(website) = &service.website {
            println!("    {}", website);
        }
    }
}
