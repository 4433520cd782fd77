mod command;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Command)] derive macro
// ============================================================================

/// Derive macro for the `Command` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Command)]
/// #[command(name = "order.create")]
/// struct CreateOrder {
///     pub id: String,
///     pub product_id: String,
/// }
/// ```
///
/// - `#[command(name = "...")]` sets the routing key the command bus uses
///   to find the handler. If omitted, defaults to the snake_case struct name
///   (`CreateOrder` becomes `create_order`).
#[proc_macro_derive(Command, attributes(command))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    command::derive_command(input)
}
