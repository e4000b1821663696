mod arith;
mod blob;
