use clap::Parser;
use meals::{
    config::{SESSION_SECRET, read_secret},
    login::login_link,
    models::UserId,
    signing::CookieSigner,
};

/// Prints a login link for a user, signed with the server secret.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    user_id: UserId,

    #[arg(long, default_value = "/")]
    continue_path: String,

    #[arg(long, default_value = "http://localhost:1111")]
    base_url: String,
}

fn main() {
    let args = Args::parse();

    let signer =
        CookieSigner::new(read_secret(SESSION_SECRET).as_bytes()).expect("Secrets misconfigured!");

    let link = login_link(&signer, &args.base_url, args.user_id, &args.continue_path)
        .expect("Failed to encode login link");

    println!("{link}");
}
