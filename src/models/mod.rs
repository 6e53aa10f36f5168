pub mod pnp;
