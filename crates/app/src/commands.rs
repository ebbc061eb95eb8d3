use std::io::Write;

use api_types::identity::{Identity, Mode};
use client::{
    AuthState, Client, Error, GuardOutcome, Result, Route, TransactionsView,
    config::Feature,
    transactions::{EditPatch, FilterPatch},
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::{
    cli::{Command, EditArgs, ExportCommand, FilterArgs, LoginArgs},
    render,
};

pub async fn run(client: &Client, command: Command) -> Result<()> {
    match command {
        Command::Login(args) => login(client, args).await,
        Command::Logout => {
            client.logout();
            println!("Logged out.");
            Ok(())
        }
        Command::Status => status(client),
        Command::Dashboard(args) => {
            let identity = admit(client, Route::Dashboard)?;
            let dashboard = client.dashboard();
            let summary = dashboard.summary(&identity.wa_id).await?;
            let recent = dashboard.recent(&identity.wa_id, args.recent).await?;
            print!(
                "{}",
                render::dashboard(
                    &summary,
                    &recent,
                    client.config().timezone,
                    client
                        .config()
                        .features
                        .is_feature_enabled(Feature::BusinessCashFlowMetrics),
                )
            );
            Ok(())
        }
        Command::Transactions(args) => {
            let identity = admit(client, Route::Transactions)?;
            let view = filtered_view(client, &identity, &args).await?;
            print!(
                "{}",
                render::transactions(&view.list(), &view.summary(), client.config().timezone)
            );
            if view.has_more() {
                println!("More on the server; pass --pages {}.", args.pages + 1);
            }
            Ok(())
        }
        Command::Edit(args) => edit(client, args).await,
        Command::Delete(args) => {
            let identity = admit(client, Route::Transactions)?;
            let view = client.transactions(&identity.wa_id);
            find(&view, &args.id).await?;
            view.delete(&args.id).await?;
            println!("Deleted {}.", args.id);
            Ok(())
        }
        Command::Categorize(args) => {
            let identity = admit(client, Route::Transactions)?;
            let view = client.transactions(&identity.wa_id);
            find(&view, &args.id).await?;
            let form = view.categorize(&args.id).await?;
            println!("{}", render::suggestion(&form));
            Ok(())
        }
        Command::Export(export) => {
            let identity = admit(client, Route::Export)?;
            let path = match export.command {
                ExportCommand::Csv(args) => {
                    let view = filtered_view(client, &identity, &args).await?;
                    client.exporter().csv(&view.filtered())?
                }
                ExportCommand::Excel(args) => {
                    client.exporter().excel(&identity.wa_id, args.scope).await?
                }
            };
            println!("Saved {}", path.display());
            Ok(())
        }
        Command::Mode(args) => mode(client, args.mode.as_deref()).await,
        Command::Config => {
            print!("{}", render::config(client.config()));
            Ok(())
        }
    }
}

/// Passes `route` through the guard; a redirect to login becomes an error.
fn admit(client: &Client, route: Route) -> Result<Identity> {
    match client.guard(route, None) {
        GuardOutcome::Render(_) => client.identity(),
        GuardOutcome::Redirect { to, return_to } => {
            let next = return_to
                .map(|route| format!("?next={}", route.path()))
                .unwrap_or_default();
            eprintln!("redirect: {}{next}", to.path());
            Err(Error::Unauthenticated)
        }
        GuardOutcome::Loading => Err(Error::Unauthenticated),
    }
}

fn status(client: &Client) -> Result<()> {
    let first = client.visits().check_in()?;
    if first {
        println!("Welcome to {}.", client.config().brand.app_name);
    }
    match client.session().identity() {
        Some(identity) => {
            println!(
                "Logged in as {} ({})",
                identity.display_name(),
                identity.wa_id
            );
            println!("Mode: {}", client.modes().current().as_str());
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

async fn filtered_view(
    client: &Client,
    identity: &Identity,
    args: &FilterArgs,
) -> Result<TransactionsView> {
    let view = client.transactions(&identity.wa_id);
    view.set_tab(args.tab);
    view.set_sort(args.sort, args.dir);
    view.set_filter(FilterPatch {
        date_from: Some(args.from),
        date_to: Some(args.to),
        actions: Some(args.actions.clone()),
        search: Some(args.search.clone()),
    });
    view.load_pages(args.pages.max(1)).await?;
    Ok(view)
}

/// Loads pages until `id` is present or the server runs out.
async fn find(view: &TransactionsView, id: &str) -> Result<()> {
    view.load().await?;
    while view.get(id).is_none() {
        if !view.load_more().await? {
            return Err(Error::InvalidInput(format!("no transaction with id {id}")));
        }
    }
    Ok(())
}

async fn edit(client: &Client, args: EditArgs) -> Result<()> {
    let identity = admit(client, Route::Transactions)?;
    let patch = EditPatch {
        action: args.action,
        amount: args.amount,
        description: args.description,
        vendor: args.vendor,
        customer: args.customer,
        category: args.category,
        terms: args.terms,
        date: args.date,
    };
    if patch.is_empty() {
        return Err(Error::InvalidInput("nothing to change".to_string()));
    }
    let view = client.transactions(&identity.wa_id);
    find(&view, &args.id).await?;
    let saved = view.edit(&args.id, patch).await?;
    println!("{}", render::transaction_line(&saved, client.config().timezone));
    Ok(())
}

async fn mode(client: &Client, requested: Option<&str>) -> Result<()> {
    let modes = client.modes();
    let Some(raw) = requested else {
        let available: Vec<&str> = modes.available().into_iter().map(Mode::as_str).collect();
        println!(
            "Mode: {} (available: {})",
            modes.current().as_str(),
            available.join(", ")
        );
        return Ok(());
    };
    let mode = Mode::parse(raw).ok_or_else(|| Error::InvalidInput(format!("unknown mode: {raw}")))?;
    let mode = modes.switch(mode).await?;
    println!("Switched to {} mode.", mode.as_str());
    Ok(())
}

fn prompt(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{text}")?;
    stdout.flush()?;
    Ok(())
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}

async fn login(client: &Client, args: LoginArgs) -> Result<()> {
    if let GuardOutcome::Redirect { .. } = client.guard(Route::Login, None) {
        let identity = client.identity()?;
        println!("Already logged in as {}.", identity.display_name());
        return Ok(());
    }

    let flow = client.auth();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut phone = args.phone;

    loop {
        let view = flow.view();
        if let Some(error) = &view.error {
            println!("{}", error.message);
        }
        match view.state {
            AuthState::Idle => {
                let input = match phone.take() {
                    Some(input) => input,
                    None => {
                        prompt("Phone number: ")?;
                        match read_line(&mut lines).await? {
                            Some(input) => input,
                            None => return Ok(()),
                        }
                    }
                };
                flow.set_phone(&input);
                let view = flow.submit_phone().await;
                if view.state == AuthState::AwaitingOtp {
                    println!("A login code was sent to {} on WhatsApp.", view.phone);
                }
            }
            AuthState::AwaitingOtp => {
                prompt("Code (or `resend`, `change`): ")?;
                let Some(input) = read_line(&mut lines).await? else {
                    return Ok(());
                };
                match input.as_str() {
                    "resend" => {
                        flow.resend().await;
                    }
                    "change" => {
                        flow.change_number();
                    }
                    code => {
                        flow.set_code(code);
                        flow.submit_code().await;
                    }
                }
            }
            AuthState::Authenticated => {
                let identity = client.identity()?;
                println!("Logged in as {}.", identity.display_name());
                return Ok(());
            }
            AuthState::SendingOtp | AuthState::VerifyingOtp => {
                return Err(Error::InvalidInput("login request still running".to_string()));
            }
        }
    }
}
