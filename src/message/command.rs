/// A typed command payload with a declared routing key.
///
/// The command bus routes by name, never by runtime type. Implement this by
/// hand or with `#[derive(Command)]`:
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Command)]
/// #[command(name = "order.create")]
/// struct CreateOrder { id: String }
///
/// assert_eq!(CreateOrder::NAME, "order.create");
/// ```
pub trait Command {
    /// The routing key handlers are subscribed under.
    const NAME: &'static str;
}
