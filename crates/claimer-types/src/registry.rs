//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage backends, pricing sources, integrations)
/// exposes a `Registry` struct naming the configuration key it answers to
/// and the factory that builds it.
pub trait ImplementationRegistry {
	/// The name used in configuration files, e.g. `"memory"` for
	/// `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	fn factory() -> Self::Factory;
}
