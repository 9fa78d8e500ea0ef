//! services/api/src/bin/openapi.rs
//!
//! Writes the service's OpenAPI 3 specification to disk, for frontend client
//! generation and API review. Takes an optional output path argument and
//! defaults to `openapi.json`.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI specification written to {path}");
    Ok(())
}
