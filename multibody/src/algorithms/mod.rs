pub mod recursive_newton_euler;
