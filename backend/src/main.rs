#[tokio::main]
async fn main() {
    meals::start_server().await;
}
