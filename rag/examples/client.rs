use reqwest::Client;
use serde_json::json;

// Smoke client for a running lexi_api. LEXI_API_URL defaults to
// http://127.0.0.1:3000; LEXI_TOKEN is a Supabase session token.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new();
    let base_url =
        std::env::var("LEXI_API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let token = std::env::var("LEXI_TOKEN").ok();

    println!("🔍 Testing Lexi API at {}", base_url);

    println!("\n📋 Health Check:");
    let health_response = client.get(format!("{}/health", base_url)).send().await?;
    println!("Status: {}", health_response.status());
    let health_json: serde_json::Value = health_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&health_json)?);

    println!("\n🏷️  Entity extraction:");
    let entities_response = client
        .post(format!("{}/api/extract-entities", base_url))
        .json(&json!({
            "text": "Conforme a la Ley N° 8 de 2010, el plazo vence el 15 de marzo de 2025."
        }))
        .send()
        .await?;
    let entities_json: serde_json::Value = entities_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&entities_json)?);

    let Some(token) = token else {
        println!("\nLEXI_TOKEN not set, skipping authenticated routes");
        return Ok(());
    };

    println!("\n📚 Documents:");
    let docs_response = client
        .get(format!("{}/api/documents", base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    let docs_json: serde_json::Value = docs_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&docs_json)?);

    println!("\n🔍 Ask:");
    let ask_response = client
        .post(format!("{}/api/ask", base_url))
        .bearer_auth(&token)
        .json(&json!({ "query": "¿Cuál es el plazo para presentar la apelación?" }))
        .send()
        .await?;
    println!("Status: {}", ask_response.status());
    let ask_json: serde_json::Value = ask_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&ask_json)?);

    println!("\n✅ Client test completed!");
    Ok(())
}
