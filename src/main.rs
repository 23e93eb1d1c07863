#[tokio::main]
async fn main() {
    outfit_contest::start_server().await;
}
