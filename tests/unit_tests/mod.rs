mod assembly;
mod dofmap;
mod function;
mod mesh;
