use std::io::Write as _;

use responses_stream::observability::init_observability;
use responses_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    init_observability();
    let responder = Responder::from_env()?;

    let request = ResponseRequest::new("gpt-5-nano")
        .instructions("Reply in one short paragraph.")
        .user_text("Explain server-sent events.")
        .store(false);

    let response = responder
        .stream(&request)?
        .on_text_delta(|delta| {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .on_error(|err| eprintln!("\nstream error: {err}"))
        .response()
        .await?;

    println!("\n[{}] usage: {:?}", response.id, response.usage);
    Ok(())
}
