//! Registry trait for self-registering KV store implementations.

/// Base trait for implementation registries.
///
/// The KV store module provides one `Registry` marker type per backend
/// (`memory`, `redis`), each implementing this trait so the backend
/// declares its own configuration name and factory function rather than
/// requiring a central match statement.
pub trait ImplementationRegistry {
	/// The name used under `kv.implementation` in configuration, e.g.
	/// `"memory"` or `"redis"`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function that builds an instance of this
	/// implementation from configuration.
	fn factory() -> Self::Factory;
}
